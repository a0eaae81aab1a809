use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::FeeError;

/// `ratio / divisor` with `divisor` a power of ten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RsnRatio {
    pub ratio: u128,
    pub divisor: u128,
}

pub(crate) fn pow10(exponent: u32) -> Result<Decimal, FeeError> {
    10i64
        .checked_pow(exponent)
        .map(Decimal::from)
        .ok_or_else(|| FeeError::Arithmetic(format!("10^{} is out of range", exponent)))
}

/// Rsn units one token base unit is worth:
/// `tokenPrice * 10^rsnDecimals / (rsnPrice * 10^tokenDecimals)`
pub fn raw_rsn_ratio(
    token_price: Decimal,
    token_decimals: u32,
    rsn_price: Decimal,
    rsn_decimals: u32,
) -> Result<Decimal, FeeError> {
    let numerator = token_price
        .checked_mul(pow10(rsn_decimals)?)
        .ok_or_else(|| FeeError::Arithmetic("rsn ratio numerator overflow".to_string()))?;
    let denominator = rsn_price
        .checked_mul(pow10(token_decimals)?)
        .ok_or_else(|| FeeError::Arithmetic("rsn ratio denominator overflow".to_string()))?;
    numerator
        .checked_div(denominator)
        .ok_or_else(|| FeeError::Arithmetic("rsn price is zero".to_string()))
}

/// Expand `1.5e-7` style notation into a plain decimal string
pub fn plain_decimal_string(value: &str) -> String {
    let value = value.trim().trim_start_matches('+');
    let Some((mantissa, exponent)) = value.split_once(|c: char| c == 'e' || c == 'E') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i64>() else {
        return value.to_string();
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{}{}", int_part, frac_part);
    let point = int_part.len() as i64 + exponent;

    let expanded = if point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else if point as usize >= digits.len() {
        format!("{}{}", digits, "0".repeat(point as usize - digits.len()))
    } else {
        let (int_digits, frac_digits) = digits.split_at(point as usize);
        format!("{}.{}", int_digits, frac_digits)
    };

    let (int_part, frac_part) = expanded.split_once('.').unwrap_or((&expanded, ""));
    let int_part = match int_part.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Turn a decimal string into an integer fraction keeping `precision`
/// significant digits
pub fn ratio_fraction(raw: &str, precision: u32, token: &str) -> Result<RsnRatio, FeeError> {
    let plain = plain_decimal_string(raw);
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((&plain, ""));
    let int_part = int_part.trim_start_matches('0');
    let precision = precision as usize;

    let power = if int_part.len() >= precision {
        0
    } else if !int_part.is_empty() {
        precision - int_part.len()
    } else {
        let leading_zeros = frac_part.chars().take_while(|c| *c == '0').count();
        if leading_zeros == frac_part.len() {
            return Err(FeeError::ImpossibleRatio(token.to_string()));
        }
        precision + leading_zeros
    };

    let frac_digits: String = frac_part
        .chars()
        .chain(std::iter::repeat('0'))
        .take(power)
        .collect();
    let numerator = format!("{}{}", int_part, frac_digits);
    let numerator = numerator.trim_start_matches('0');
    if numerator.is_empty() {
        return Err(FeeError::ImpossibleRatio(token.to_string()));
    }

    let ratio = numerator
        .parse::<u128>()
        .map_err(|e| FeeError::Arithmetic(format!("rsn ratio [{}]: {}", numerator, e)))?;
    let divisor = 10u128
        .checked_pow(power as u32)
        .ok_or_else(|| FeeError::Arithmetic(format!("rsn ratio divisor 10^{} overflows", power)))?;

    Ok(RsnRatio { ratio, divisor })
}

pub fn rsn_ratio(
    token: &str,
    token_price: Decimal,
    token_decimals: u32,
    rsn_price: Decimal,
    rsn_decimals: u32,
    precision: u32,
) -> Result<RsnRatio, FeeError> {
    let raw = raw_rsn_ratio(token_price, token_decimals, rsn_price, rsn_decimals)?;
    ratio_fraction(&raw.normalize().to_string(), precision, token)
}
