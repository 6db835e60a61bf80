//! Shared serialization primitives.
//!
//! - [`encoding`]: `Encode`/`Decode` traits and the fixed-width big-endian
//!   scalar implementations the image format is built from

pub mod encoding;
