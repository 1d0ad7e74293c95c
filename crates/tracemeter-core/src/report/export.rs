//! Trace export file

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::models::TraceRecord;

/// Write `records` to `path` as a JSON array.
///
/// Absent fields are written as `null`. The file is created or truncated;
/// any IO failure, including one surfaced through the serializer, is
/// reported as [`Error::Write`].
#[instrument(skip_all, fields(records = records.len(), path = %path.display(), pretty = pretty))]
pub fn write_traces(path: &Path, records: &[TraceRecord], pretty: bool) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::write(path, e))?;
    let mut writer = BufWriter::new(file);

    let written = if pretty {
        serde_json::to_writer_pretty(&mut writer, records)
    } else {
        serde_json::to_writer(&mut writer, records)
    };

    written.map_err(|e| match e.io_error_kind() {
        Some(_) => Error::write(path, e.into()),
        None => Error::Serialization(e),
    })?;

    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| Error::write(path, e))?;

    info!("Exported traces");
    Ok(())
}
