//! Clients for the external generation services. Callers treat failures
//! as transient: log, skip the cycle, keep every piece of kernel state.

pub mod suggest;
