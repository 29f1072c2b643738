//! Store access: pool initialization, lock retry and schema materialization

pub mod init;
pub mod retry;
pub mod schema_sync;

pub use init::*;
pub use retry::*;
pub use schema_sync::*;
