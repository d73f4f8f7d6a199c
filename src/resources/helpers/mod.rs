//! Shared helpers used by resource `apply()` implementations.
pub mod download;
pub mod fs;
