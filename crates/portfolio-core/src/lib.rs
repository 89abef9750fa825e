pub mod aggregator;
pub mod error;
pub mod portfolio;
pub mod stats;
pub mod traits;
pub mod types;

pub use aggregator::*;
pub use error::*;
pub use portfolio::*;
pub use traits::*;
pub use types::*;
