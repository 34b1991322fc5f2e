//! Wall-clock timing for the coordinating process.

use std::time::{Duration, Instant};

/// Phase timings of one run.
///
/// Only the coordinating process records phases; the others skip timing
/// and the run body holds `None` for them.
#[derive(Debug)]
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    pub procs: usize,
    pub matrix_size: usize,
    pub iterations: usize,
}

impl Stats {
    pub fn new(procs: usize, matrix_size: usize, iterations: usize) -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            procs,
            matrix_size,
            iterations,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    /// Time `f` as phase `name`.
    pub fn time<T>(&mut self, name: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.add_phase(name, start.elapsed());
        out
    }

    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }

    /// Seconds since the stats were created.
    pub fn elapsed_secs(&self) -> f64 {
        self.total_start.elapsed().as_secs_f64()
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== meshmv run stats ===");
        eprintln!("  Processes:              {}", self.procs);
        eprintln!("  Matrix size:            {}", self.matrix_size);
        eprintln!("  Iterations:             {}", self.iterations);
        for (name, dur) in &self.phases {
            eprintln!("  {:<24}{:>8.3}s", name, dur.as_secs_f64());
        }
        if self.iterations > 0 {
            if let Some((_, dur)) = self.phases.iter().find(|(name, _)| *name == "iterate") {
                eprintln!(
                    "  Per iteration:          {:>8.6}s",
                    dur.as_secs_f64() / self.iterations as f64
                );
            }
        }
        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}
