//! Utilities shared by the Roomcast binaries: logging setup and clocks.

pub mod logger;
pub mod time;
