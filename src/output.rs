//! Rendering of listing rows.
//!
//! Supports tab-separated lines, CSV, and column-batched bare names.

use std::io::Write;

use anyhow::Result;
use csv::WriterBuilder;

use crate::parameter::Row;

/// Terminal width assumed when it cannot be detected.
pub const DEFAULT_WIDTH: usize = 80;

/// Spaces between columns of bare names.
const COLUMN_GAP: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tsv,
    Csv,
}

/// Writes each row as tab-joined fields followed by a newline.
pub fn write_tsv<W: Write>(out: &mut W, rows: &[Row]) -> Result<()> {
    for row in rows {
        writeln!(out, "{}", row.join("\t"))?;
    }
    Ok(())
}

/// Writes rows as CSV records without a header row.
pub fn write_csv<W: Write>(out: &mut W, rows: &[Row]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(out);
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Lays bare names out in as many left-aligned columns as fit in `width`,
/// filling each line left to right.
pub fn write_columns<W: Write>(out: &mut W, names: &[String], width: usize) -> Result<()> {
    let Some(longest) = names.iter().map(|n| n.chars().count()).max() else {
        return Ok(());
    };
    let cell = longest + COLUMN_GAP;
    let per_line = (width / cell).max(1);

    for chunk in names.chunks(per_line) {
        let Some((last, rest)) = chunk.split_last() else {
            continue;
        };
        for name in rest {
            write!(out, "{name:<cell$}")?;
        }
        writeln!(out, "{last}")?;
    }
    Ok(())
}

/// True when every row is a single bare name.
pub fn is_bare_listing(rows: &[Row]) -> bool {
    rows.iter().all(|r| r.len() == 1)
}

/// Width of the controlling terminal, or [`DEFAULT_WIDTH`].
pub fn terminal_width() -> usize {
    crossterm::terminal::size()
        .ok()
        .map(|(cols, _)| usize::from(cols))
        .filter(|&cols| cols > 0)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Renders a listing the way the `ls` command prints it.
///
/// Bare names go into columns only when `columns` is `Some(width)` (stdout
/// is a terminal) and the format is not CSV.
pub fn render<W: Write>(
    out: &mut W,
    rows: &[Row],
    format: OutputFormat,
    columns: Option<usize>,
) -> Result<()> {
    match (format, columns) {
        (OutputFormat::Csv, _) => write_csv(out, rows),
        (OutputFormat::Tsv, Some(width)) if !rows.is_empty() && is_bare_listing(rows) => {
            let names: Vec<String> = rows.iter().map(|r| r[0].clone()).collect();
            write_columns(out, &names, width)
        }
        (OutputFormat::Tsv, _) => write_tsv(out, rows),
    }
}
