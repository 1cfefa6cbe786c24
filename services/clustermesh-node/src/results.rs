//! Per-node summaries appended to a JSON-lines results file.

use anyhow::Context;
use clustermesh_mesh::NodeSummary;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Append one line per summary, creating the file if needed.
pub fn append(path: &Path, summaries: &[NodeSummary]) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening results file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for summary in summaries {
        serde_json::to_writer(&mut writer, summary)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
