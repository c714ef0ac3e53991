//! # Adapters
//!
//! Line framing over any async byte stream.

pub mod framing;

pub use framing::{read_frame, write_frame, FrameError};
