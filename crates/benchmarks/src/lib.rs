//! Benchmarks for the crosscheck conflict review system
//!
//! Measures detection cost across record sizes and sub-detector mixes.

/// Re-export core types for benchmarks
pub use crosscheck_core;
pub use crosscheck_detector;
