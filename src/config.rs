//! Run configuration and its validation.

use crate::error::{MeshError, Result};
use crate::mesh::engine::DEFAULT_ITERATIONS;
use crate::mesh::grid::ProcessGrid;
use crate::pattern::FillPattern;

/// Smallest accepted matrix dimension.
pub const MIN_MATRIX_SIZE: usize = 4;

/// Parameters of one benchmark run, identical on every process.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Dimension N of the N×N matrix.
    pub matrix_size: usize,
    pub iterations: usize,
    pub matrix_pattern: FillPattern,
    pub vector_pattern: FillPattern,
    /// Gather and report the full vector after every iteration.
    pub snapshots: bool,
}

impl RunConfig {
    pub fn new(matrix_size: usize) -> Self {
        Self {
            matrix_size,
            iterations: DEFAULT_ITERATIONS,
            matrix_pattern: FillPattern::Identity,
            vector_pattern: FillPattern::Incremental,
            snapshots: false,
        }
    }

    /// Check the configuration against `procs` processes and return the
    /// mesh they form.
    ///
    /// Every process runs this on its own before any communicator is
    /// built. Nothing tells the other processes when it fails.
    pub fn validate(&self, procs: usize) -> Result<ProcessGrid> {
        let n = self.matrix_size;
        if n < MIN_MATRIX_SIZE {
            return Err(MeshError::Configuration(format!(
                "matrix size should be at least {MIN_MATRIX_SIZE}, got {n}"
            )));
        }
        if procs == 0 || (n as u128 * n as u128) % procs as u128 != 0 {
            return Err(MeshError::Configuration(format!(
                "matrix size {n} not compatible with {procs} processes"
            )));
        }
        let grid = ProcessGrid::build(procs)?;
        if n % grid.side() != 0 {
            return Err(MeshError::Configuration(format!(
                "matrix size {n} does not split into {} blocks per side",
                grid.side()
            )));
        }
        Ok(grid)
    }

    /// Side length of each process's tile on `grid`.
    pub fn block_size(&self, grid: &ProcessGrid) -> usize {
        self.matrix_size / grid.side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_benchmark() {
        let cfg = RunConfig::new(8);
        assert_eq!(cfg.iterations, 20);
        assert_eq!(cfg.matrix_pattern, FillPattern::Identity);
        assert_eq!(cfg.vector_pattern, FillPattern::Incremental);
        assert!(!cfg.snapshots);
    }

    #[test]
    fn small_matrix_is_rejected() {
        for procs in [1, 4, 9] {
            assert!(matches!(
                RunConfig::new(3).validate(procs),
                Err(MeshError::Configuration(_))
            ));
        }
    }

    #[test]
    fn indivisible_size_is_rejected() {
        assert!(RunConfig::new(5).validate(4).is_err());
        assert!(RunConfig::new(4).validate(3).is_err());
        assert!(RunConfig::new(4).validate(0).is_err());
    }

    #[test]
    fn non_square_process_count_is_rejected() {
        // 16 is divisible by 2, but 2 processes do not form a square mesh.
        assert!(matches!(
            RunConfig::new(4).validate(2),
            Err(MeshError::Configuration(_))
        ));
    }

    #[test]
    fn valid_config_yields_the_mesh() {
        let cfg = RunConfig::new(12);
        let grid = cfg.validate(9).unwrap();
        assert_eq!(grid.side(), 3);
        assert_eq!(cfg.block_size(&grid), 4);
    }
}
