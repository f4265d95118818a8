//! Utility library for the steering control software

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod archive;
pub mod filter;
pub mod host;
pub mod logger;
pub mod maths;
pub mod params;
pub mod ring_buffer;
pub mod session;
pub mod time;
