use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use orphansweep_core::domain::{LastSweep, StoreStats};
use orphansweep_core::Library;

/// Share of well-formed images that no album references, as a percentage.
pub(crate) fn orphan_share(stats: &StoreStats) -> f64 {
    let well_formed = stats.total_images.saturating_sub(stats.malformed_images);
    if well_formed == 0 {
        return 0.0;
    }
    stats.orphan_images as f64 * 100.0 / well_formed as f64
}

pub(crate) fn format_last_sweep(last: Option<&LastSweep>) -> String {
    match last {
        Some(last) => format!(
            "{} ({} checked, {} deleted)",
            last.at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            last.scanned,
            last.deleted
        ),
        None => "never".to_string(),
    }
}

pub fn run(library: &Library) -> Result<()> {
    let stats = library.status()?;
    let last = library.last_sweep()?;

    println!();
    println!("  Orphansweep Status");
    println!("  ==================");
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Collection"), Cell::new("Documents"), Cell::new("Notes")]);

    let orphan_cell = if stats.orphan_images > 0 {
        Cell::new(format!(
            "{} orphans ({:.1}%)",
            stats.orphan_images,
            orphan_share(&stats)
        ))
        .fg(Color::Yellow)
    } else {
        Cell::new("no orphans").fg(Color::Green)
    };
    table.add_row(vec![Cell::new("images"), Cell::new(stats.total_images), orphan_cell]);
    if stats.malformed_images > 0 {
        table.add_row(vec![
            Cell::new(""),
            Cell::new(""),
            Cell::new(format!("{} without an integer id", stats.malformed_images)).fg(Color::Red),
        ]);
    }

    let album_note = if stats.malformed_albums > 0 {
        Cell::new(format!("{} without an images list", stats.malformed_albums)).fg(Color::Red)
    } else {
        Cell::new("")
    };
    table.add_row(vec![Cell::new("albums"), Cell::new(stats.total_albums), album_note]);

    println!("{table}");
    println!();
    println!(
        "   Batch size: {:>6}        Strategy: {}",
        library.batch_size()?,
        library.strategy()?
    );
    println!("   Last sweep: {}", format_last_sweep(last.as_ref()));
    println!();
    if stats.orphan_images > 0 {
        println!("  Run 'orphansweep sweep' to delete orphan images.");
        println!();
    }

    Ok(())
}
