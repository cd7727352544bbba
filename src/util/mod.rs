//! Utility modules: timeouts and lock helpers.

pub mod sync;
pub mod timeout;
