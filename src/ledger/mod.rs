pub mod assembler;
pub mod encoder;
pub mod models;
pub mod selection;

pub use assembler::TransactionAssembler;
pub use encoder::{EncodedTransaction, JsonTransactionEncoder, TransactionEncoder};
pub use models::{AssetBalance, PendingOutput};
pub use selection::GreedySelector;
