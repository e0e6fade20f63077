//! Microphone plumbing: a cpal capture stream feeding a lock-free ring
//! buffer, and the meter thread turning frames into level events.

pub mod capture;
pub mod meter;
