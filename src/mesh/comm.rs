//! Communication backend abstraction for the mesh protocol.
//!
//! Provides the trait every messaging substrate implements (group
//! collectives, tagged point-to-point, communicator splitting) and a
//! single-process implementation for the 1×1 mesh.

use crate::error::{MeshError, Result};

/// Abstraction over inter-process communication within one group.
///
/// A value of an implementing type is a communicator: a fixed, ordered
/// set of ranks. Every collective must be entered by all members of the
/// group, and every call blocks until the calling rank's part is done.
///
/// Implementations: `SingleProcessComm` (1 rank), `LocalComm` (threads
/// over in-process channels), `MpiComm` (via mpi crate).
pub trait CommunicationBackend {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn num_ranks(&self) -> usize;

    /// Partition the group into sub-groups by `color`.
    ///
    /// Ranks inside each sub-group are ordered by `key`, ties broken by
    /// the rank in this group. Collective over this group.
    fn split(&self, color: usize, key: usize) -> Result<Self>
    where
        Self: Sized;

    /// A new communicator with the same members and an isolated message
    /// space. Collective over this group.
    fn duplicate(&self) -> Result<Self>
    where
        Self: Sized;

    /// Element-wise sum of `local` across all ranks, written into
    /// `result` on `root` only. Other ranks' `result` is left untouched.
    fn reduce_sum(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()>;

    /// Overwrite `data` on every rank with `root`'s `data`.
    fn broadcast(&self, data: &mut [i64], root: usize) -> Result<()>;

    /// Concatenate every rank's `local` in rank order into `result` on
    /// `root`. `result` must hold `local.len() * num_ranks()` elements on
    /// the root and is ignored elsewhere.
    fn gather(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()>;

    /// Blocking send of `data` to `dest` under `tag`.
    fn send(&self, data: &[i64], dest: usize, tag: i32) -> Result<()>;

    /// Blocking receive from `source` under `tag` into `data`.
    fn receive(&self, data: &mut [i64], source: usize, tag: i32) -> Result<()>;

    /// Synchronization barrier.
    fn barrier(&self) -> Result<()>;
}

/// Communication backend for a mesh of exactly one process.
///
/// Collectives degenerate to local copies. Point-to-point traffic is an
/// error because there is no peer to talk to.
pub struct SingleProcessComm;

impl SingleProcessComm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SingleProcessComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn split(&self, _color: usize, _key: usize) -> Result<Self> {
        Ok(Self)
    }

    fn duplicate(&self) -> Result<Self> {
        Ok(Self)
    }

    fn reduce_sum(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()> {
        check_root(root)?;
        check_len("reduce", local.len(), result.len())?;
        result.copy_from_slice(local);
        Ok(())
    }

    fn broadcast(&self, _data: &mut [i64], root: usize) -> Result<()> {
        // Single process: the root already holds the data.
        check_root(root)
    }

    fn gather(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()> {
        check_root(root)?;
        check_len("gather", local.len(), result.len())?;
        result.copy_from_slice(local);
        Ok(())
    }

    fn send(&self, _data: &[i64], dest: usize, tag: i32) -> Result<()> {
        Err(MeshError::Communication(format!(
            "send to rank {dest} (tag {tag}) in a single-process group"
        )))
    }

    fn receive(&self, _data: &mut [i64], source: usize, tag: i32) -> Result<()> {
        Err(MeshError::Communication(format!(
            "receive from rank {source} (tag {tag}) in a single-process group"
        )))
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}

fn check_root(root: usize) -> Result<()> {
    if root != 0 {
        return Err(MeshError::Communication(format!(
            "root rank {root} outside a single-process group"
        )));
    }
    Ok(())
}

fn check_len(op: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(MeshError::Communication(format!(
            "{op} buffer length mismatch: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}
