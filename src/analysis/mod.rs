//! Market analysis module - staged pipeline from comparable sales to adjusted values

pub mod adjust;
pub mod columns;
pub mod error;
pub mod fetch;
pub mod inputs;
pub mod parse;
pub mod periods;
pub mod pipeline;
pub mod stats;
pub mod trend;
pub mod types;
pub mod utils;
pub mod write;

pub use error::{AnalysisError, Result};
pub use types::*;
