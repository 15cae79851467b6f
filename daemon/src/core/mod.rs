pub mod error;
pub mod rewards;
pub mod settlement;
pub mod storage;
pub mod withdrawal;

pub use error::EngineError;
