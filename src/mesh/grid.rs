//! Square process mesh: rank ↔ (row, col) mapping.

use crate::error::{MeshError, Result};

/// Position of a process in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coords {
    pub row: usize,
    pub col: usize,
}

impl Coords {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A `side × side` mesh of `side²` processes.
///
/// Ranks map to coordinates in row-major order with no wraparound and no
/// reordering, so the same process count always yields the same layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGrid {
    procs: usize,
    side: usize,
}

impl ProcessGrid {
    /// Build the mesh for `procs` processes. Fails unless `procs` is a
    /// positive perfect square.
    pub fn build(procs: usize) -> Result<Self> {
        let side = integer_sqrt(procs);
        if procs == 0 || side * side != procs {
            return Err(MeshError::Configuration(format!(
                "process count {procs} is not a perfect square"
            )));
        }
        Ok(Self { procs, side })
    }

    /// Total number of processes.
    pub fn procs(&self) -> usize {
        self.procs
    }

    /// Mesh side length, `sqrt(procs)`.
    pub fn side(&self) -> usize {
        self.side
    }

    pub fn coords(&self, rank: usize) -> Coords {
        debug_assert!(rank < self.procs);
        Coords::new(rank / self.side, rank % self.side)
    }

    pub fn rank_at(&self, coords: Coords) -> usize {
        debug_assert!(coords.row < self.side && coords.col < self.side);
        coords.row * self.side + coords.col
    }

    /// Partner of `coords` in the transpose exchange that moves a
    /// row-indexed result from the first column onto the first row.
    ///
    /// (r, 0) and (0, r) are partners; (0, 0) is its own partner.
    /// Processes on neither the first row nor the first column take no
    /// part and get `None`.
    pub fn transpose_partner(&self, coords: Coords) -> Option<Coords> {
        match (coords.row, coords.col) {
            (r, 0) => Some(Coords::new(0, r)),
            (0, c) => Some(Coords::new(c, 0)),
            _ => None,
        }
    }
}

/// Explicit identity of one process, handed to every component instead
/// of letting each one look its rank up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshContext {
    pub rank: usize,
    pub coords: Coords,
    pub grid: ProcessGrid,
}

impl MeshContext {
    pub fn new(grid: ProcessGrid, rank: usize) -> Result<Self> {
        if rank >= grid.procs() {
            return Err(MeshError::Configuration(format!(
                "rank {rank} outside a mesh of {} processes",
                grid.procs()
            )));
        }
        Ok(Self {
            rank,
            coords: grid.coords(rank),
            grid,
        })
    }

    /// True on the process that collects results and reports timing.
    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }
}

fn integer_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    // Correct float rounding at the edges. A square that overflows is
    // larger than any `n`.
    while root.checked_mul(root).map_or(true, |sq| sq > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= n) {
        root += 1;
    }
    root
}
