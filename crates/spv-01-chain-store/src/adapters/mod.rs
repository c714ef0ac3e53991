//! # Adapters

pub mod header_file;

pub use header_file::HeaderFile;
