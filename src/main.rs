use clap::Parser;
use meshmv::config::RunConfig;
use meshmv::output;
use meshmv::pattern::FillPattern;
use meshmv::runner::{self, RunReport};
use meshmv::sink::{DiagnosticSink, DumpSink, NullSink, TracingSink};
use std::io;

/// Distributed block matrix-vector multiplication benchmark
#[derive(Parser)]
#[command(name = "meshmv", version)]
struct Cli {
    /// Matrix dimension N (the matrix is N x N)
    matrix_size: usize,

    /// Number of processes in the local mesh (must be a perfect square)
    #[arg(long, short = 'n', default_value_t = 4)]
    procs: usize,

    /// Number of iterations
    #[arg(long, default_value_t = meshmv::mesh::engine::DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Matrix fill pattern
    #[arg(long, value_enum, default_value_t = FillPattern::Identity)]
    matrix: FillPattern,

    /// Initial vector fill pattern
    #[arg(long, value_enum, default_value_t = FillPattern::Incremental)]
    vector: FillPattern,

    /// Gather the full vector after every iteration
    #[arg(long)]
    snapshot: bool,

    /// Print matrix tiles and vectors to stdout
    #[arg(long)]
    dump: bool,

    /// Print the final vector to stdout as CSV
    #[arg(long)]
    print_result: bool,

    /// Run the single-process reference instead of the mesh
    #[arg(long, conflicts_with = "procs")]
    serial: bool,

    /// Print per-phase timings to stderr
    #[arg(long)]
    stats: bool,

    /// Run as one rank of an MPI job instead of a local mesh
    #[cfg(feature = "distributed")]
    #[arg(long, conflicts_with_all = ["procs", "serial"])]
    mpi: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = RunConfig {
        matrix_size: cli.matrix_size,
        iterations: cli.iterations,
        matrix_pattern: cli.matrix,
        vector_pattern: cli.vector,
        snapshots: cli.snapshot,
    };

    let sink: Box<dyn DiagnosticSink> = if cli.dump {
        Box::new(DumpSink::new(io::stdout()))
    } else if tracing::enabled!(tracing::Level::DEBUG) {
        Box::new(TracingSink)
    } else {
        Box::new(NullSink)
    };

    let report = run(&cli, &config, sink.as_ref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    // Only the coordinating process holds a report.
    let Some(report) = report else {
        return;
    };

    output::write_elapsed(report.stats.elapsed_secs(), &mut io::stderr()).unwrap_or_else(|e| {
        eprintln!("Output error: {}", e);
        std::process::exit(1);
    });

    if cli.print_result {
        output::write_vector_csv(&report.vector, &mut io::stdout()).unwrap_or_else(|e| {
            eprintln!("Output error: {}", e);
            std::process::exit(1);
        });
    }

    if cli.stats {
        report.stats.display();
    }
}

fn run(
    cli: &Cli,
    config: &RunConfig,
    sink: &dyn DiagnosticSink,
) -> meshmv::error::Result<Option<RunReport>> {
    #[cfg(feature = "distributed")]
    if cli.mpi {
        return run_mpi(config, sink);
    }

    if cli.serial {
        return runner::run_serial(config).map(Some);
    }
    runner::run_local(config, cli.procs, sink).map(Some)
}

#[cfg(feature = "distributed")]
fn run_mpi(
    config: &RunConfig,
    sink: &dyn DiagnosticSink,
) -> meshmv::error::Result<Option<RunReport>> {
    use meshmv::error::MeshError;
    use meshmv::mesh::comm_mpi::MpiComm;

    let universe = mpi::initialize()
        .ok_or_else(|| MeshError::Communication("MPI already initialized".into()))?;
    let world = MpiComm::world(&universe);
    runner::run_process(&world, config, sink)
}
