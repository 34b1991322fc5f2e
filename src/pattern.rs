//! Fill patterns for matrix tiles and vector slices.
//!
//! Every pattern is a function of the *global* index, so the tiles held
//! by different processes join up into the same matrix the serial
//! reference builds in one piece.

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FillPattern {
    /// All elements 0.
    Zero,
    /// 1 on the diagonal, 0 elsewhere. For vectors, every element is 1.
    Identity,
    /// 1 where `row + col` is even.
    Checkerboard,
    /// `row * n + col` for matrices, the index for vectors.
    Incremental,
    /// All elements 1.
    Ones,
}

impl FillPattern {
    /// Element (`row`, `col`) of the `n × n` matrix.
    pub fn matrix_value(self, row: usize, col: usize, n: usize) -> i64 {
        match self {
            FillPattern::Zero => 0,
            FillPattern::Identity => i64::from(row == col),
            FillPattern::Checkerboard => i64::from((row + col) % 2 == 0),
            FillPattern::Incremental => (row * n + col) as i64,
            FillPattern::Ones => 1,
        }
    }

    /// Element `index` of the length-`n` vector.
    pub fn vector_value(self, index: usize) -> i64 {
        match self {
            FillPattern::Zero => 0,
            FillPattern::Identity | FillPattern::Ones => 1,
            FillPattern::Checkerboard => i64::from(index % 2 == 0),
            FillPattern::Incremental => index as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_diagonal() {
        let p = FillPattern::Identity;
        assert_eq!(p.matrix_value(2, 2, 4), 1);
        assert_eq!(p.matrix_value(2, 3, 4), 0);
    }

    #[test]
    fn checkerboard_alternates() {
        let p = FillPattern::Checkerboard;
        assert_eq!(p.matrix_value(0, 0, 4), 1);
        assert_eq!(p.matrix_value(0, 1, 4), 0);
        assert_eq!(p.matrix_value(1, 1, 4), 1);
        assert_eq!(p.vector_value(3), 0);
    }

    #[test]
    fn incremental_counts_row_major() {
        let p = FillPattern::Incremental;
        assert_eq!(p.matrix_value(1, 2, 4), 6);
        assert_eq!(p.vector_value(5), 5);
    }
}
