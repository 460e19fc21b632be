//! Mutualnet registration directory (component B, SPEC_FULL.md §4.B).

pub mod clock;
pub mod config;
pub mod directory;
pub mod liveness;

pub use clock::ClockState;
pub use config::DirectoryConfig;
pub use directory::Directory;
pub use liveness::{LivenessProbe, TcpLivenessProbe};
