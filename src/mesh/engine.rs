//! Fixed-count iteration of the distributed matrix–vector product.
//!
//! Each iteration runs the same six steps on every process:
//!
//! 1. local multiply of the tile with the "past" slice,
//! 2. sum reduction of the partial products to the row leader,
//! 3. transpose exchange moving each row result to its column leader,
//! 4. broadcast from the column leader, which becomes the next "past",
//! 5. optional snapshot gather of the full vector,
//! 6. mesh-wide barrier.
//!
//! All steps are blocking collectives or rendezvous; there is no
//! convergence test and no overlap between iterations.

use crate::error::Result;
use crate::pattern::FillPattern;
use crate::sink::DiagnosticSink;

use super::block::{alloc_zeroed, fill_slice, LocalBlockStore};
use super::collector::ResultCollector;
use super::comm::CommunicationBackend;
use super::groups::{CommunicatorGroups, LEADER};

/// Iterations per run unless configured otherwise.
pub const DEFAULT_ITERATIONS: usize = 20;

pub struct IterationEngine<'a, C> {
    groups: &'a CommunicatorGroups<C>,
    store: LocalBlockStore,
    /// Row-reduced result; meaningful on row leaders after the reduce and
    /// on column leaders after the relay.
    result: Vec<i64>,
    sink: &'a dyn DiagnosticSink,
    iterations: usize,
    snapshots: bool,
}

impl<'a, C: CommunicationBackend> IterationEngine<'a, C> {
    pub fn new(
        groups: &'a CommunicatorGroups<C>,
        store: LocalBlockStore,
        sink: &'a dyn DiagnosticSink,
    ) -> Result<Self> {
        let result = alloc_zeroed(store.block_size())?;
        sink.matrix(groups.context().rank, "matrix A", store.block());
        Ok(Self {
            groups,
            store,
            result,
            sink,
            iterations: DEFAULT_ITERATIONS,
            snapshots: false,
        })
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Gather the full vector to the coordinator after every iteration
    /// and report it to the sink.
    pub fn with_snapshots(mut self, snapshots: bool) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Set the initial vector: column leaders fill their slice from
    /// `pattern` and broadcast it down their column.
    pub fn seed(&mut self, pattern: FillPattern) -> Result<()> {
        let ctx = *self.groups.context();
        let block_size = self.store.block_size();
        if self.groups.is_col_leader() {
            fill_slice(self.store.past_mut(), pattern, ctx.coords.col * block_size);
        } else {
            self.store.past_mut().fill(0);
        }
        self.groups.col().broadcast(self.store.past_mut(), LEADER)?;
        self.sink.vector(ctx.rank, "vectorPast", None, self.store.past());
        Ok(())
    }

    /// Run all iterations.
    pub fn run(&mut self) -> Result<()> {
        let ctx = *self.groups.context();
        let _span = tracing::info_span!(
            "iterate",
            rank = ctx.rank,
            row = ctx.coords.row,
            col = ctx.coords.col,
            iterations = self.iterations
        )
        .entered();
        for k in 0..self.iterations {
            self.step(k)?;
        }
        Ok(())
    }

    /// One full iteration.
    pub fn step(&mut self, k: usize) -> Result<()> {
        let _span = tracing::debug_span!("iteration", k).entered();
        let rank = self.groups.context().rank;

        self.store.local_multiply();
        self.sink.vector(rank, "vectorCur", Some(k), self.store.current());

        self.row_reduce()?;
        self.groups.transpose_exchange(&mut self.result)?;
        self.column_broadcast()?;
        if self.groups.is_col_leader() {
            self.sink.vector(rank, "vectorResult", Some(k), self.store.past());
        }

        if self.snapshots {
            if let Some(full) = self.collector().gather(self.store.past())? {
                self.sink.vector(rank, "vectorFinalResult", Some(k), &full);
            }
        }

        tracing::debug!(rank, "barrier");
        self.groups.mesh().barrier()
    }

    fn row_reduce(&mut self) -> Result<()> {
        tracing::debug!(rank = self.groups.context().rank, "reducing row partial products");
        self.groups
            .row()
            .reduce_sum(self.store.current(), &mut self.result, LEADER)
    }

    fn column_broadcast(&mut self) -> Result<()> {
        if self.groups.is_col_leader() {
            self.store.past_mut().copy_from_slice(&self.result);
        }
        self.groups.col().broadcast(self.store.past_mut(), LEADER)
    }

    fn collector(&self) -> ResultCollector<'a, C> {
        ResultCollector::new(self.groups)
    }

    /// Gather the current vector to the coordinator. See
    /// `ResultCollector::gather`.
    pub fn gather_final(&self) -> Result<Option<Vec<i64>>> {
        self.collector().gather(self.store.past())
    }

    pub fn store(&self) -> &LocalBlockStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::comm::SingleProcessComm;
    use crate::mesh::comm_local::LocalMesh;
    use crate::mesh::grid::ProcessGrid;
    use crate::sink::NullSink;

    fn run_mesh(
        n: usize,
        procs: usize,
        matrix: FillPattern,
        vector: FillPattern,
        iterations: usize,
    ) -> Vec<i64> {
        let grid = ProcessGrid::build(procs).unwrap();
        let block_size = n / grid.side();
        let results = LocalMesh::run(procs, |world| {
            let groups = CommunicatorGroups::build(&world, grid)?;
            let store = LocalBlockStore::new(n, block_size, groups.context().coords, matrix)?;
            let mut engine = IterationEngine::new(&groups, store, &NullSink)?
                .with_iterations(iterations);
            engine.seed(vector)?;
            engine.run()?;
            engine.gather_final()
        })
        .unwrap();
        results.into_iter().flatten().next().unwrap()
    }

    #[test]
    fn identity_is_a_fixed_point() {
        let full = run_mesh(4, 4, FillPattern::Identity, FillPattern::Incremental, 20);
        assert_eq!(full, vec![0, 1, 2, 3]);
    }

    #[test]
    fn one_step_matches_dense_product() {
        // Incremental 4x4 times [0, 1, 2, 3].
        let full = run_mesh(4, 4, FillPattern::Incremental, FillPattern::Incremental, 1);
        assert_eq!(full, vec![14, 38, 62, 86]);
    }

    #[test]
    fn single_process_applies_the_block_repeatedly() {
        let grid = ProcessGrid::build(1).unwrap();
        let groups = CommunicatorGroups::build(&SingleProcessComm, grid).unwrap();
        let store =
            LocalBlockStore::new(4, 4, groups.context().coords, FillPattern::Checkerboard).unwrap();
        let mut engine = IterationEngine::new(&groups, store, &NullSink)
            .unwrap()
            .with_iterations(3);
        engine.seed(FillPattern::Ones).unwrap();
        engine.run().unwrap();
        // Checkerboard rows each hold two ones; one application doubles
        // a constant vector.
        assert_eq!(engine.gather_final().unwrap(), Some(vec![8, 8, 8, 8]));
    }

    #[test]
    fn seed_broadcasts_leader_slice_down_the_column() {
        let grid = ProcessGrid::build(4).unwrap();
        let pasts = LocalMesh::run(4, |world| {
            let groups = CommunicatorGroups::build(&world, grid)?;
            let store =
                LocalBlockStore::new(4, 2, groups.context().coords, FillPattern::Identity)?;
            let mut engine = IterationEngine::new(&groups, store, &NullSink)?;
            engine.seed(FillPattern::Incremental)?;
            Ok(engine.store().past().to_vec())
        })
        .unwrap();
        assert_eq!(pasts, vec![vec![0, 1], vec![2, 3], vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn zero_iterations_return_the_seed() {
        let full = run_mesh(6, 9, FillPattern::Ones, FillPattern::Incremental, 0);
        assert_eq!(full, (0..6).collect::<Vec<i64>>());
    }
}
