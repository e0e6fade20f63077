pub mod audio;
pub mod kernel;
pub mod services;

// Convenient top-level access for drivers and tests.
pub use kernel::session::{CoachSession, SessionConfig};
