//! tf-migrate CLI
//!
//! Bulk storage-tier migration for tierflow.

use clap::Parser;
use tf_cli_common::{format_number, format_tib, init_logging};
use tf_migrator::{RunReport, TierTotals};

mod args;
mod run;

use args::{Cli, ReportFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Initialize logging (to stderr, so stdout is clean for the JSON report)
    init_logging(args.log_level)?;

    let report = match run::execute(&args).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    match args.report_format {
        ReportFormat::Text => print_summary(&report),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Err(e) = report.ensure_success() {
        std::process::exit(e.exit_code()); // Partial failure
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    let counters = &report.counters;
    let line = |label: &str, totals: &TierTotals| {
        eprintln!(
            "  {label:<20} {:>15}  {}",
            format_number(totals.count),
            format_tib(totals.bytes)
        );
    };

    eprintln!();
    if report.is_cancelled() {
        eprintln!("Migration cancelled:");
    } else {
        eprintln!("Migration completed:");
    }
    line("Total objects", &counters.total);
    line("Hot", &counters.hot);
    line("Cool", &counters.cool);
    line("Archive", &counters.archive);
    line("Archive -> Hot", &counters.archive_to_hot);
    line("Archive -> Cool", &counters.archive_to_cool);
    eprintln!(
        "  {} -> {}: {} batches, {} objects{}",
        report.source_tier,
        report.target_tier,
        format_number(counters.batches_submitted),
        format_number(counters.objects_submitted),
        if report.dry_run { " (what-if, nothing sent)" } else { "" }
    );
    eprintln!("  Prefixes scanned:    {}", format_number(report.units_scanned));
    eprintln!(
        "  Duration:            {:.2}s",
        report.duration().as_secs_f64()
    );

    for failure in &report.failures {
        eprintln!("  Error: {failure}");
    }
}
