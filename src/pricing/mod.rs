pub mod coingecko;
pub mod coinmarketcap;
pub mod dexhunter;
pub mod resolver;
pub mod sources;
pub mod spectrum;
pub mod weighted;

pub use resolver::{sources_from_settings, PriceResolver};
