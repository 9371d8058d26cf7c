//! Host-process engine adapter.
//!
//! Lets quire drive a typesetting program installed on the local machine
//! through the same engine boundary a bundled engine build would use. The
//! private filesystem lives in a temporary directory; absolute virtual paths
//! in arguments and environment values are rebased onto it before the
//! program starts.

mod engine;
mod sandbox;

pub use engine::{HostEngine, HostEngineFactory, HostModuleSource, resolve_program};
pub use sandbox::HostFs;
