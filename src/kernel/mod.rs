//! Conversation kernel: the four cooperating components behind the
//! coaching loop (voice activity, social battery, rolling transcript,
//! trigger engine) plus the session that fuses them.
//!
//! # INVARIANTS
//! - Components never read each other's live fields. The session captures
//!   snapshots and passes them down, so one tick sees one consistent view.
//! - Numeric state clamps instead of panicking.
//! - No component owns a timer. Everything advances on explicit `now`
//!   parameters; the async driver in [`session`] owns the only cadence.

pub mod battery;
pub mod event;
pub mod session;
pub mod transcript;
pub mod trigger;
pub mod vad;
