//! Single-process reference: the whole matrix in one tile, no messaging.

use crate::config::RunConfig;
use crate::error::Result;
use crate::mesh::block::{alloc_zeroed, fill_slice, DenseBlock};

/// Apply the full matrix `config.iterations` times to the initial vector.
pub fn run(config: &RunConfig) -> Result<Vec<i64>> {
    let n = config.matrix_size;
    let _span = tracing::info_span!("reference", n, iterations = config.iterations).entered();

    let mut matrix = DenseBlock::zeros(n, n)?;
    matrix.fill(config.matrix_pattern, 0, 0, n);

    let mut past = alloc_zeroed(n)?;
    let mut current = alloc_zeroed(n)?;
    fill_slice(&mut past, config.vector_pattern, 0);

    for _ in 0..config.iterations {
        matrix.mul_vec(&past, &mut current);
        std::mem::swap(&mut past, &mut current);
    }
    Ok(past)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::FillPattern;

    #[test]
    fn identity_keeps_the_vector() {
        let cfg = RunConfig::new(5);
        assert_eq!(run(&cfg).unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn ones_matrix_scales_by_n_each_step() {
        let mut cfg = RunConfig::new(4);
        cfg.matrix_pattern = FillPattern::Ones;
        cfg.vector_pattern = FillPattern::Ones;
        cfg.iterations = 3;
        assert_eq!(run(&cfg).unwrap(), vec![64; 4]);
    }

    #[test]
    fn zero_matrix_clears_the_vector() {
        let mut cfg = RunConfig::new(4);
        cfg.matrix_pattern = FillPattern::Zero;
        cfg.iterations = 1;
        assert_eq!(run(&cfg).unwrap(), vec![0; 4]);
    }
}
