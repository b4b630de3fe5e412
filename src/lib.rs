pub mod amount;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod csv;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod model;
pub mod sim;
pub mod tracker;

pub use amount::Amount;
pub use dashboard::Dashboard;
pub use error::Error;
pub use model::{SystemSnapshot, TransactionRecord, TxHash, TxKind, TxStatus};
pub use tracker::{Action, Tracker};
