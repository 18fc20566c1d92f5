pub mod error;
pub mod types;

pub mod aggregate;
pub mod fees;
pub mod guard;
pub mod solver;
pub mod waterfall;

pub use error::FundEngineError;
pub use types::*;

/// Standard result type for all fund-engine operations
pub type FundEngineResult<T> = Result<T, FundEngineError>;
