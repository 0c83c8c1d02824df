//! Proximity queries over streamed particles

pub mod scanner;

pub use scanner::{SearchCursor, SearchResult, SearchScanner, resolve_particle};
