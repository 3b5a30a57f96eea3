//! Types shared between the sandbox core and the HTTP layer

pub mod errors;
pub mod execution;
pub mod registry;

pub use errors::*;
pub use execution::*;
pub use registry::*;
