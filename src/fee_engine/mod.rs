pub mod derive;
pub mod ratio;

pub use derive::{DerivationInputs, FeeEngine};
