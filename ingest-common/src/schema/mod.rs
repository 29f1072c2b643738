//! Schema inference and table definitions

pub mod definition;
pub mod inference;

pub use definition::*;
pub use inference::*;
