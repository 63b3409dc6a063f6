use skyplot::persistence::log_entry::{AllocationLogEntry, TransitionKind};
use skyplot::persistence::medium::{read_log_file, MemoryLog, LOG_FILE_NAME};
use skyplot::persistence::store::ReservationStore;
use skyplot::AllocatorConfig;
use std::path::Path;

#[derive(Debug, Default)]
struct AuditReport {
    lines: usize,
    assigns: usize,
    orphans: usize,
    cursor_advances: usize,
    parse_errors: Vec<String>,
    /// Lines replay skips: unparsable ones plus impossible transitions.
    corrupt_entries: usize,
    assigned: usize,
    orphaned: usize,
}

// Replays a copy of the lines in memory; the log file itself is only read.
fn audit(lines: Vec<String>) -> Result<AuditReport, String> {
    let mut report = AuditReport {
        lines: lines.len(),
        ..AuditReport::default()
    };
    for (index, line) in lines.iter().enumerate() {
        match AllocationLogEntry::parse_line(line, index + 1) {
            Ok(entry) => match entry.kind {
                TransitionKind::Assign => report.assigns += 1,
                TransitionKind::Orphan => report.orphans += 1,
                TransitionKind::CursorAdvance => report.cursor_advances += 1,
            },
            Err(err) => report.parse_errors.push(err.to_string()),
        }
    }
    let store = ReservationStore::load(Box::new(MemoryLog::from_lines(lines)))?;
    let stats = store.stats();
    report.corrupt_entries = stats.corrupt_entries;
    report.assigned = stats.assigned;
    report.orphaned = stats.orphaned;
    Ok(report)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(root) = args.get(1) else {
        eprintln!("usage: log_audit <root>");
        std::process::exit(1);
    };
    let config = match AllocatorConfig::load(Path::new(root)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("log_audit: {}", err);
            std::process::exit(1);
        }
    };
    let path = config.storage_dir.join(LOG_FILE_NAME);
    if !path.exists() {
        println!("no reservation log under {}", config.storage_dir.display());
        return;
    }
    let report = match read_log_file(&path).and_then(audit) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("log_audit: {}", err);
            std::process::exit(1);
        }
    };

    println!("log lines: {}", report.lines);
    println!(
        "assign/orphan/cursor: {}/{}/{}",
        report.assigns, report.orphans, report.cursor_advances
    );
    println!(
        "replayed: assigned={}, orphaned={}",
        report.assigned, report.orphaned
    );
    println!(
        "corrupt entries: {} ({} unparsable)",
        report.corrupt_entries,
        report.parse_errors.len()
    );
    for err in &report.parse_errors {
        eprintln!("log_audit: {}", err);
    }
    if report.corrupt_entries > 0 {
        std::process::exit(2);
    }
}
