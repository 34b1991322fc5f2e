//! Iterative distributed dense matrix–vector multiplication on a 2D
//! process mesh, for benchmarking row/column communication patterns.

pub mod config;
pub mod error;
pub mod mesh;
pub mod output;
pub mod pattern;
pub mod reference;
pub mod runner;
pub mod sink;
pub mod stats;
