//! Multi-process MPI tests.
//!
//! These tests require MPI and the `distributed` feature flag.
//! Run with: mpirun -n 4 cargo test --features distributed --test distributed_test
//!
//! Without MPI installed, these tests are excluded from the default build.

#![cfg(feature = "distributed")]

use meshmv::config::RunConfig;
use meshmv::mesh::comm::CommunicationBackend;
use meshmv::mesh::comm_mpi::MpiComm;
use meshmv::reference;
use meshmv::runner::run_process;
use meshmv::sink::NullSink;

#[test]
fn mpi_run_matches_reference() {
    // Works for any perfect-square rank count, including a single rank.
    let universe = mpi::initialize().expect("MPI init failed");
    let world = MpiComm::world(&universe);

    let side = (1..=8)
        .find(|s| s * s == world.num_ranks())
        .expect("run with a perfect-square number of ranks");
    let cfg = RunConfig::new(4 * side);

    let report = run_process(&world, &cfg, &NullSink).expect("run failed");
    if world.rank() == 0 {
        let report = report.expect("rank 0 must hold the result");
        assert_eq!(report.vector, reference::run(&cfg).unwrap());
    } else {
        assert!(report.is_none());
    }
}
