use std::io::Write;

use super::Tag;
use crate::error::DriveTagResult;

/// Output formats for `tags list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Table,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Table => "table",
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
        }
    }
}

/// Write `tags` to `out` in the requested format.
pub fn export_tags<W: Write>(tags: &[Tag], format: ExportFormat, mut out: W) -> DriveTagResult<()> {
    match format {
        ExportFormat::Table => export_table(tags, &mut out)?,
        ExportFormat::Csv => export_csv(tags, &mut out)?,
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, tags)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn export_csv<W: Write>(tags: &[Tag], out: W) -> DriveTagResult<()> {
    let mut wtr = csv::Writer::from_writer(out);

    // Header row comes from the serde renames
    for tag in tags {
        wtr.serialize(tag)?;
    }
    if tags.is_empty() {
        wtr.write_record(["Name", "Archtype", "Description"])?;
    }

    wtr.flush()?;
    Ok(())
}

fn export_table<W: Write>(tags: &[Tag], out: &mut W) -> DriveTagResult<()> {
    let headers = ["Name", "Archtype", "Description"];
    let mut widths = headers.map(|h| h.chars().count());
    for tag in tags {
        widths[0] = widths[0].max(tag.name.chars().count());
        widths[1] = widths[1].max(tag.archtype.chars().count());
        widths[2] = widths[2].max(tag.description.chars().count());
    }

    write_row(out, &headers, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &[rule[0].as_str(), rule[1].as_str(), rule[2].as_str()], &widths)?;
    for tag in tags {
        write_row(
            out,
            &[tag.name.as_str(), tag.archtype.as_str(), tag.description.as_str()],
            &widths,
        )?;
    }
    Ok(())
}

fn write_row<W: Write>(out: &mut W, cells: &[&str; 3], widths: &[usize; 3]) -> DriveTagResult<()> {
    let line = format!(
        "{:<w0$}  {:<w1$}  {}",
        cells[0],
        cells[1],
        cells[2],
        w0 = widths[0],
        w1 = widths[1],
    );
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}
