//! Shared domain types, error taxonomy and collaborator traits of the
//! news signal pipeline.

pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
