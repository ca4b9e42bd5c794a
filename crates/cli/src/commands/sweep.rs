use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use orphansweep_core::domain::SweepReport;
use orphansweep_core::{Library, SweepOverrides, SweepProgress};

fn spinner(verbose: bool) -> ProgressBar {
    // Log lines and a live spinner fight over the terminal.
    if verbose {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.green} {pos:>6} checked  {prefix:.dim} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn run(library: &Library, overrides: &SweepOverrides, verbose: bool) -> Result<()> {
    let pb = spinner(verbose);

    let report = library.sweep(
        overrides,
        None,
        Some(&mut |progress| match progress {
            SweepProgress::Started {
                strategy,
                batch_size,
            } => {
                pb.set_prefix(format!("{strategy}, batches of {batch_size}"));
            }
            SweepProgress::BatchFetched { .. } => {}
            SweepProgress::ImageChecked { id, .. } => {
                pb.inc(1);
                pb.set_message(format!("image {id}"));
            }
            SweepProgress::ImageDeleted { id } => {
                pb.set_message(format!("deleted image {id}"));
            }
            SweepProgress::MalformedSkipped { key } => {
                pb.println(format!("  skipped malformed image document (key {key})"));
            }
            SweepProgress::Finished { .. } => {
                pb.finish_and_clear();
            }
        }),
    );
    // The spinner must not outlive a failed pass.
    if report.is_err() {
        pb.abandon();
    }
    let report = report?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &SweepReport) {
    let elapsed = report.finished_at - report.started_at;
    println!();
    if report.dry_run {
        println!(
            "  Dry run: {} of {} images are orphans ({} ms).",
            report.deleted,
            report.scanned,
            elapsed.num_milliseconds()
        );
        if !report.orphan_ids.is_empty() {
            let ids: Vec<String> = report.orphan_ids.iter().map(|id| id.to_string()).collect();
            println!("  Would delete: {}", ids.join(", "));
        }
    } else {
        println!(
            "  Checked {} images, deleted {} orphans, kept {} ({} ms).",
            report.scanned,
            report.deleted,
            report.retained,
            elapsed.num_milliseconds()
        );
    }
    if report.already_gone > 0 {
        println!("  {} orphans were already removed by someone else.", report.already_gone);
    }
    if !report.malformed_images.is_empty() {
        println!(
            "  Skipped {} image documents without an integer id.",
            report.malformed_images.len()
        );
    }
    if report.malformed_albums > 0 {
        println!(
            "  Ignored {} albums without an images list.",
            report.malformed_albums
        );
    }
    if report.cancelled {
        println!("  Sweep was cancelled before finishing.");
    }
    println!();
}
