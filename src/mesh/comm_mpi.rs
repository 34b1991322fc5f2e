//! MPI communication backend for the mesh protocol.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `CommunicationBackend` on top of an `mpi` crate
//! communicator.
//!
//! # Usage
//!
//! The caller must initialize MPI and keep the universe alive for as
//! long as any `MpiComm` exists:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let world = MpiComm::world(&universe);
//! ```
//!
//! MPI's default error handler aborts the job on failure, so the
//! `Result`s returned here only carry argument errors detected before
//! entering MPI.

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;

use crate::error::{MeshError, Result};

use super::comm::CommunicationBackend;

/// MPI-based communication backend.
pub struct MpiComm {
    comm: SimpleCommunicator,
}

impl MpiComm {
    /// Wrap the world communicator of an initialized universe.
    pub fn world(universe: &Universe) -> Self {
        Self {
            comm: universe.world(),
        }
    }

    fn check_rank(&self, rank: usize) -> Result<i32> {
        if rank >= self.num_ranks() {
            return Err(MeshError::Communication(format!(
                "rank {rank} outside a group of {}",
                self.num_ranks()
            )));
        }
        Ok(rank as i32)
    }
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn num_ranks(&self) -> usize {
        self.comm.size() as usize
    }

    fn split(&self, color: usize, key: usize) -> Result<Self> {
        self.comm
            .split_by_color_with_key(Color::with_value(color as i32), key as i32)
            .map(|comm| Self { comm })
            .ok_or_else(|| MeshError::Communication(format!("split with color {color} failed")))
    }

    fn duplicate(&self) -> Result<Self> {
        Ok(Self {
            comm: self.comm.duplicate(),
        })
    }

    fn reduce_sum(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()> {
        let root_rank = self.check_rank(root)?;
        let root_process = self.comm.process_at_rank(root_rank);
        if self.comm.rank() == root_rank {
            root_process.reduce_into_root(local, result, SystemOperation::sum());
        } else {
            root_process.reduce_into(local, SystemOperation::sum());
        }
        Ok(())
    }

    fn broadcast(&self, data: &mut [i64], root: usize) -> Result<()> {
        let root_rank = self.check_rank(root)?;
        self.comm.process_at_rank(root_rank).broadcast_into(data);
        Ok(())
    }

    fn gather(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()> {
        let root_rank = self.check_rank(root)?;
        let root_process = self.comm.process_at_rank(root_rank);
        if self.comm.rank() == root_rank {
            if result.len() != local.len() * self.num_ranks() {
                return Err(MeshError::Communication(format!(
                    "gather buffer holds {} elements, expected {}",
                    result.len(),
                    local.len() * self.num_ranks()
                )));
            }
            root_process.gather_into_root(local, result);
        } else {
            root_process.gather_into(local);
        }
        Ok(())
    }

    fn send(&self, data: &[i64], dest: usize, tag: i32) -> Result<()> {
        let dest_rank = self.check_rank(dest)?;
        self.comm.process_at_rank(dest_rank).send_with_tag(data, tag);
        Ok(())
    }

    fn receive(&self, data: &mut [i64], source: usize, tag: i32) -> Result<()> {
        let source_rank = self.check_rank(source)?;
        let status = self
            .comm
            .process_at_rank(source_rank)
            .receive_into_with_tag(data, tag);
        let count = status.count(i64::equivalent_datatype());
        if count as usize != data.len() {
            return Err(MeshError::Communication(format!(
                "message from rank {source} (tag {tag}) has {count} elements, expected {}",
                data.len()
            )));
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.comm.barrier();
        Ok(())
    }
}
