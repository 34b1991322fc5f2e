//! Run orchestration: the per-process body and the launchers around it.

use crate::config::RunConfig;
use crate::error::{MeshError, Result};
use crate::mesh::block::LocalBlockStore;
use crate::mesh::comm::CommunicationBackend;
use crate::mesh::comm_local::LocalMesh;
use crate::mesh::engine::IterationEngine;
use crate::mesh::grid::MeshContext;
use crate::mesh::groups::CommunicatorGroups;
use crate::reference;
use crate::sink::DiagnosticSink;
use crate::stats::Stats;

/// What the coordinating process ends up with.
#[derive(Debug)]
pub struct RunReport {
    /// The full length-N vector after the last iteration.
    pub vector: Vec<i64>,
    pub stats: Stats,
}

/// Body of one process in an SPMD run over `world`.
///
/// Returns the report on the coordinating process (rank 0) and `None` on
/// every other process.
pub fn run_process<C: CommunicationBackend>(
    world: &C,
    config: &RunConfig,
    sink: &dyn DiagnosticSink,
) -> Result<Option<RunReport>> {
    let grid = config.validate(world.num_ranks())?;
    let ctx = MeshContext::new(grid, world.rank())?;
    let _span = tracing::info_span!("process", rank = ctx.rank).entered();

    world.barrier()?;
    let mut stats = ctx
        .is_coordinator()
        .then(|| Stats::new(grid.procs(), config.matrix_size, config.iterations));

    let setup_start = std::time::Instant::now();
    let groups = CommunicatorGroups::build(world, grid)?;
    let coords = ctx.coords;
    let store = LocalBlockStore::new(
        config.matrix_size,
        config.block_size(&grid),
        coords,
        config.matrix_pattern,
    )?;
    let mut engine = IterationEngine::new(&groups, store, sink)?
        .with_iterations(config.iterations)
        .with_snapshots(config.snapshots);
    engine.seed(config.vector_pattern)?;
    if let Some(stats) = stats.as_mut() {
        stats.add_phase("setup", setup_start.elapsed());
    }

    let iterate_start = std::time::Instant::now();
    engine.run()?;
    groups.mesh().barrier()?;
    if let Some(stats) = stats.as_mut() {
        stats.add_phase("iterate", iterate_start.elapsed());
    }

    let collect_start = std::time::Instant::now();
    let vector = engine.gather_final()?;
    if let Some(stats) = stats.as_mut() {
        stats.add_phase("collect", collect_start.elapsed());
    }

    match (vector, stats) {
        (Some(vector), Some(stats)) => {
            tracing::info!(len = vector.len(), "result collected");
            Ok(Some(RunReport { vector, stats }))
        }
        _ => Ok(None),
    }
}

/// Run the whole mesh in this process, one thread per rank.
///
/// The configuration is checked before any thread starts.
pub fn run_local(
    config: &RunConfig,
    procs: usize,
    sink: &dyn DiagnosticSink,
) -> Result<RunReport> {
    config.validate(procs)?;
    let _span = tracing::info_span!("local_mesh", procs, n = config.matrix_size).entered();
    let reports = LocalMesh::run(procs, |world| run_process(&world, config, sink))?;
    reports
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| MeshError::Communication("coordinator produced no result".into()))
}

/// Run the single-process reference path.
pub fn run_serial(config: &RunConfig) -> Result<RunReport> {
    // One process: only the size floor can fail.
    config.validate(1)?;
    let mut stats = Stats::new(1, config.matrix_size, config.iterations);
    let vector = stats.time("iterate", || reference::run(config))?;
    Ok(RunReport { vector, stats })
}
