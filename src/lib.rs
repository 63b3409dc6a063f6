pub mod allocator;
pub mod config;
pub mod grid;
pub mod persistence;
pub mod telemetry;

pub use allocator::error::AllocatorError;
pub use allocator::service::{AllocationService, AllocatorStats};
pub use config::{AllocatorConfig, AllocatorSettings};
pub use grid::coordinate::GridCoordinate;
pub use grid::spiral::SpiralSequencer;

use config::{AppConfig, CliCommand};

pub fn run(args: &[String]) -> Result<(), String> {
    let app = AppConfig::from_args(args)?;
    let config = AllocatorConfig::load(&app.root)?;
    telemetry::logging::init(&config.storage_dir)?;
    let allocator = std::sync::Arc::new(AllocationService::open(&config)?);

    let settings = allocator.settings();
    let stats = allocator.stats()?;
    println!("skyplot: reservation scan");
    println!("- root: {}", app.root.display());
    println!("- storage: {}", settings.storage_dir.display());
    println!(
        "- island spacing: {}, spawn exclusion radius: {}",
        settings.spacing, settings.exclusion.radius
    );
    println!(
        "- reservations: assigned={}, orphaned={}, pooled={}",
        stats.store.assigned, stats.store.orphaned, stats.pooled_orphans
    );
    println!("- cursor: {}", stats.cursor);
    if stats.store.corrupt_entries > 0 {
        println!("- corrupt log entries skipped: {}", stats.store.corrupt_entries);
    }

    match app.command {
        CliCommand::Status => {}
        CliCommand::Allocate { owner } => {
            // Same shape as a join request: the allocation runs off the
            // caller's thread and the result comes back over the join.
            let worker = std::sync::Arc::clone(&allocator);
            let handle = std::thread::spawn(move || worker.allocate(&owner));
            let plot = handle
                .join()
                .map_err(|_| "allocation worker panicked".to_string())??;
            println!("allocated {} {}", plot.x, plot.z);
        }
        CliCommand::Release { x, z } => {
            let plot = GridCoordinate::new(x, z);
            if allocator.release(plot)? {
                println!("released {} {}", x, z);
            } else {
                println!("{} was not assigned", plot);
            }
        }
        CliCommand::Compact => {
            let lines = allocator.compact()?;
            println!("compacted reservation log to {} lines", lines);
        }
    }
    Ok(())
}
