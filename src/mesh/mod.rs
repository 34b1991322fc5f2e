//! Distributed block matrix–vector iteration over a square process mesh.

pub mod block;
pub mod collector;
pub mod comm;
pub mod comm_local;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod engine;
pub mod grid;
pub mod groups;
