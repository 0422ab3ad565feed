//! Types shared between the radar viewer core, its HTTP surface and tests.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
