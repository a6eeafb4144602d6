//! JSON-lines output sink.
//!
//! One file per output granularity, `<case>_<kind>.jsonl`, opened the first
//! time that granularity is written. Each line is the [`OutputContext`]
//! fields followed by a `state` object.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use tundra_core::{OutputContext, OutputKind, OutputSink, SinkError, StateSnapshot};

#[derive(Serialize)]
struct Line<'a> {
    #[serde(flatten)]
    context: &'a OutputContext,
    state: &'a StateSnapshot,
}

/// Writes every output record as one JSON object per line.
pub struct JsonLinesSink {
    dir: PathBuf,
    case_name: String,
    writers: HashMap<OutputKind, BufWriter<File>>,
}

impl JsonLinesSink {
    /// A sink writing under `dir`, creating the directory if needed.
    pub fn create(dir: &Path, case_name: &str) -> Result<Self, SinkError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            case_name: case_name.to_owned(),
            writers: HashMap::new(),
        })
    }

    /// Flush every open file.
    pub fn finish(mut self) -> Result<(), SinkError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn write(
        &mut self,
        kind: OutputKind,
        ctx: &OutputContext,
        state: &StateSnapshot,
    ) -> Result<(), SinkError> {
        let writer = match self.writers.entry(kind) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = output_path(&self.dir, &self.case_name, kind);
                debug!(path = %path.display(), "Opening output file");
                entry.insert(BufWriter::new(File::create(&path)?))
            }
        };
        serde_json::to_writer(
            &mut *writer,
            &Line {
                context: ctx,
                state,
            },
        )
        .map_err(|e| SinkError::Encode {
            reason: e.to_string(),
        })?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Path of the file for one granularity.
fn output_path(dir: &Path, case_name: &str, kind: OutputKind) -> PathBuf {
    let suffix = match kind {
        OutputKind::Daily => "daily",
        OutputKind::Monthly => "monthly",
        OutputKind::Yearly => "yearly",
        OutputKind::Region => "region",
        OutputKind::Restart => "restart",
    };
    dir.join(format!("{case_name}_{suffix}.jsonl"))
}

impl OutputSink for JsonLinesSink {
    fn on_day(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.write(OutputKind::Daily, ctx, state)
    }

    fn on_month(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.write(OutputKind::Monthly, ctx, state)
    }

    fn on_year(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.write(OutputKind::Yearly, ctx, state)
    }

    fn on_region_year(
        &mut self,
        ctx: &OutputContext,
        state: &StateSnapshot,
    ) -> Result<(), SinkError> {
        self.write(OutputKind::Region, ctx, state)
    }

    fn on_restart(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.write(OutputKind::Restart, ctx, state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tundra_types::{CohortId, Stage};

    use super::*;

    #[test]
    fn writes_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("tundra-sink-{}", std::process::id()));
        let mut sink = JsonLinesSink::create(&dir, "case").unwrap();
        let ctx = OutputContext {
            chtid: CohortId(7),
            stage: Stage::Transient,
            calendar_year: 1901,
            year_index: 0,
            output_year_index: 0,
            month: Some(0),
            day: None,
        };
        let state = StateSnapshot::new().with("soil_water", 1.5);
        sink.on_month(&ctx, &state).unwrap();
        sink.on_month(&ctx, &state).unwrap();
        let path = output_path(&dir, "case", OutputKind::Monthly);
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines.first().unwrap()).unwrap();
        assert_eq!(first["chtid"], 7);
        assert_eq!(first["calendar_year"], 1901);
        assert_eq!(first["state"]["soil_water"], 1.5);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
