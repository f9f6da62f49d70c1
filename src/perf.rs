use serde_json::{Map, Value as JsonValue, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) const DEFAULT_PERF_LOG: &str = "stampa_perf.log";

#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
    count_totals: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    /// `record_id` is the record's position in the batch, when the span
    /// belongs to one.
    pub fn log_span_ms(&self, name: &str, record_id: Option<usize>, ms: f64) {
        let line = json!({
            "type": "perf.span",
            "name": name,
            "record_id": record_id,
            "unit": "ms",
            "ms": round_ms(ms),
        });
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn log_counts(&self, name: &str, record_id: Option<usize>, counts: &[(&str, u64)]) {
        let mut count_map = Map::new();
        for (key, value) in counts {
            count_map.insert((*key).to_string(), JsonValue::from(*value));
        }
        let line = json!({
            "type": "perf.counts",
            "name": name,
            "record_id": record_id,
            "counts": count_map,
        });
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let full_key = format!("{name}.{key}");
                let entry = state.count_totals.entry(full_key).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

// Aggregates are written to a sibling `<stem>_hot.log` when the last handle
// goes away.
impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(hot_path_for(&self.path)) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| {
            b.1.partial_cmp(a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        for (rank, (name, ms)) in spans.into_iter().take(100).enumerate() {
            let count = *self.span_counts.get(name).unwrap_or(&1);
            let avg = if count == 0 { 0.0 } else { ms / count as f64 };
            let line = json!({
                "type": "perf.hot.span",
                "rank": rank + 1,
                "name": name,
                "unit": "ms",
                "agg": "sum",
                "ms": round_ms(*ms),
                "count": count,
                "avg_ms": round_ms(avg),
            });
            let _ = writeln!(writer, "{line}");
        }

        let mut counts: Vec<(&String, &u64)> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (name, value)) in counts.into_iter().take(100).enumerate() {
            let line = json!({
                "type": "perf.hot.count",
                "rank": rank + 1,
                "name": name,
                "value": value,
            });
            let _ = writeln!(writer, "{line}");
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_PERF_LOG);
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    #[test]
    fn hot_log_is_written_on_drop() {
        let dir = temp_dir("perf_log");
        let path = dir.join("perf.log");
        let logger = PerfLogger::new(&path).expect("perf logger");
        logger.log_span_ms("compose", Some(0), 2.0);
        logger.log_span_ms("compose", Some(1), 4.0);
        logger.log_span_ms("plan", None, 0.5);
        logger.log_counts("batch", None, &[("pages", 8), ("records", 2)]);
        drop(logger);

        let log = std::fs::read_to_string(&path).expect("perf log");
        let first: JsonValue = serde_json::from_str(log.lines().next().expect("line")).expect("json");
        assert_eq!(first["type"], "perf.span");
        assert_eq!(first["record_id"], 0);
        assert!(log.contains("\"record_id\":null"));

        let hot = std::fs::read_to_string(dir.join("perf_hot.log")).expect("hot log");
        let lines: Vec<JsonValue> = hot
            .lines()
            .map(|line| serde_json::from_str(line).expect("json"))
            .collect();
        assert_eq!(lines[0]["name"], "compose");
        assert_eq!(lines[0]["count"], 2);
        assert_eq!(lines[0]["avg_ms"], 3.0);
        assert!(lines.iter().any(|l| l["name"] == "batch.pages" && l["value"] == 8));
    }

    #[test]
    fn hot_path_keeps_directory_and_stem() {
        assert_eq!(
            hot_path_for(Path::new("/tmp/x/run.jsonl")),
            PathBuf::from("/tmp/x/run_hot.log")
        );
        assert_eq!(hot_path_for(Path::new("plain")), PathBuf::from("plain_hot.log"));
    }
}
