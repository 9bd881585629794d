//! Defines the data structures and models used throughout the application.
//!
//! This includes the district registry, readings and stored snapshots, upstream provider
//! payloads, and the response envelope returned to callers.

mod district;
mod providers;
mod response;
mod snapshot;

pub use district::*;
pub use providers::*;
pub use response::*;
pub use snapshot::*;
