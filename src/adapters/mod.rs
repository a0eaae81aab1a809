pub mod chains;
pub mod registry;
pub mod traits;

pub use registry::ChainRegistry;
