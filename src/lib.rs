pub mod cancel;
pub mod config;
pub mod directory;
pub mod error;
pub mod listing;
pub mod ops;
pub mod output;
pub mod parameter;
pub mod pool;

pub use cancel::CancellationToken;
pub use error::{ExitStatus, SsmError};
