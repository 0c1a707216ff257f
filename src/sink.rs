//! JSON-lines record store.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use wxdash_weather::{RecordSink, RequestKey, ValidatedRecord};

/// Appends one JSON object per fetched record.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonLinesSink {
    fn store(&self, key: &RequestKey, record: &ValidatedRecord) -> std::io::Result<()> {
        let line = serde_json::json!({
            "key": key.to_string(),
            "stored_at": Utc::now(),
            "record": record,
        });
        let mut file = self.file.lock();
        serde_json::to_writer(&mut *file, &line)?;
        file.write_all(b"\n")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use wxdash_weather::{Service, SunTimes};

    #[test]
    fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("records.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();

        let record = ValidatedRecord::SunTimes(SunTimes {
            sunrise: Utc::now(),
            sunset: Utc::now(),
            day_length: Some(50400),
        });
        let key = RequestKey::coordinates(Service::SunTimes, 33.45, -112.07, "2026-06-01");
        sink.store(&key, &record).unwrap();
        sink.store(&key, &record).unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["key"], "sun_times:33.45,-112.07,2026-06-01");
        assert_eq!(parsed["record"]["kind"], "sun_times");
        assert_eq!(parsed["record"]["day_length"], 50400);
    }
}
