//! Per-process storage: one matrix tile and two vector slices.

use crate::error::{MeshError, Result};
use crate::pattern::FillPattern;

use super::grid::Coords;

/// Dense tile stored as one contiguous row-major buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseBlock {
    pub nrows: usize,
    pub ncols: usize,
    data: Vec<i64>,
}

impl DenseBlock {
    /// Allocate a zeroed `nrows × ncols` tile.
    pub fn zeros(nrows: usize, ncols: usize) -> Result<Self> {
        let len = nrows.checked_mul(ncols).ok_or_else(|| {
            MeshError::ResourceExhaustion(format!("block of {nrows}x{ncols} overflows"))
        })?;
        Ok(Self {
            nrows,
            ncols,
            data: alloc_zeroed(len)?,
        })
    }

    /// Fill from `pattern` evaluated over an `n × n` matrix, with this
    /// tile's top-left element at (`row_offset`, `col_offset`).
    pub fn fill(&mut self, pattern: FillPattern, row_offset: usize, col_offset: usize, n: usize) {
        let ncols = self.ncols;
        for (i, row) in self.data.chunks_exact_mut(ncols.max(1)).enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = pattern.matrix_value(row_offset + i, col_offset + j, n);
            }
        }
    }

    pub fn row(&self, i: usize) -> &[i64] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    pub fn get(&self, i: usize, j: usize) -> i64 {
        self.data[i * self.ncols + j]
    }

    /// `out = self · x` with wrapping accumulation.
    pub fn mul_vec(&self, x: &[i64], out: &mut [i64]) {
        debug_assert_eq!(x.len(), self.ncols);
        debug_assert_eq!(out.len(), self.nrows);
        for (i, acc) in out.iter_mut().enumerate() {
            *acc = self
                .row(i)
                .iter()
                .zip(x)
                .fold(0i64, |sum, (&a, &b)| sum.wrapping_add(a.wrapping_mul(b)));
        }
    }
}

/// Allocate a zeroed vector, reporting allocation failure instead of
/// aborting.
pub fn alloc_zeroed(len: usize) -> Result<Vec<i64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|e| {
        MeshError::ResourceExhaustion(format!("cannot allocate {len} elements: {e}"))
    })?;
    v.resize(len, 0);
    Ok(v)
}

/// Fill `slice` from `pattern`, with its first element at global index
/// `offset`.
pub fn fill_slice(slice: &mut [i64], pattern: FillPattern, offset: usize) {
    for (i, value) in slice.iter_mut().enumerate() {
        *value = pattern.vector_value(offset + i);
    }
}

/// A process's tile of the matrix plus the input ("past") and output
/// ("current") slices of the vector.
///
/// For the tile at mesh position (r, c) with block size `b`, the tile
/// covers global rows `r*b..(r+1)*b` and columns `c*b..(c+1)*b`; `past`
/// is indexed by column, `current` by row.
pub struct LocalBlockStore {
    block: DenseBlock,
    past: Vec<i64>,
    current: Vec<i64>,
}

impl LocalBlockStore {
    /// Allocate and fill the tile for `coords`. `past` starts zeroed.
    pub fn new(
        matrix_size: usize,
        block_size: usize,
        coords: Coords,
        pattern: FillPattern,
    ) -> Result<Self> {
        let mut block = DenseBlock::zeros(block_size, block_size)?;
        block.fill(
            pattern,
            coords.row * block_size,
            coords.col * block_size,
            matrix_size,
        );
        Ok(Self {
            block,
            past: alloc_zeroed(block_size)?,
            current: alloc_zeroed(block_size)?,
        })
    }

    pub fn block_size(&self) -> usize {
        self.past.len()
    }

    pub fn block(&self) -> &DenseBlock {
        &self.block
    }

    pub fn past(&self) -> &[i64] {
        &self.past
    }

    pub fn past_mut(&mut self) -> &mut [i64] {
        &mut self.past
    }

    pub fn current(&self) -> &[i64] {
        &self.current
    }

    /// `current[i] = Σ_j past[j] * block[i][j]`. Touches nothing but
    /// `current`.
    pub fn local_multiply(&mut self) {
        self.block.mul_vec(&self.past, &mut self.current);
    }
}
