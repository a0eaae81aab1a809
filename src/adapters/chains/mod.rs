pub mod bitcoin;
pub mod cardano;
pub mod ergo;
pub mod evm;

pub use bitcoin::EsploraClient;
pub use cardano::KoiosClient;
pub use ergo::ErgoExplorerClient;
pub use evm::EvmRpcClient;
