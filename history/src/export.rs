//! Export execution history to JSON, JSONL or CSV, optionally gzipped.
//!
//! A columnar format can be requested; without a columnar backend
//! available the export falls back to JSON and says so in the log.

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::ExecutionRecord;
use crate::store::{HistoryStore, RecordQuery};

/// Maximum bytes of a text field carried into CSV cells
const CSV_TEXT_LIMIT: usize = 1024;

/// Supported export formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Pretty-printed JSON array
    Json,
    /// Compact JSON array
    JsonCompact,
    /// One JSON object per line
    Jsonl,
    /// Flattened scalar columns
    Csv,
    /// Columnar; falls back to JSON when unavailable
    Parquet,
}

/// Export selection and rendering options
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub query: RecordQuery,
    pub gzip: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            query: RecordQuery::default(),
            gzip: false,
        }
    }
}

/// Outcome of an export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportResult {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub records_exported: usize,
    pub duration_ms: i64,
}

/// Renders execution history snapshots to files
pub struct ExportService {
    store: std::sync::Arc<dyn HistoryStore>,
}

impl ExportService {
    pub fn new(store: std::sync::Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Export matching records to a file. With `gzip` the content is
    /// compressed and `.gz` appended to the path.
    pub async fn export_to_file(&self, path: &Path, options: &ExportOptions) -> Result<ExportResult> {
        let started = Utc::now();
        let records = self.store.list_records(&options.query).await?;
        let content = self.render(&records, options.format)?;

        let target = if options.gzip {
            let mut with_gz = path.as_os_str().to_owned();
            with_gz.push(".gz");
            PathBuf::from(with_gz)
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if options.gzip {
            let file = std::fs::File::create(&target)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(content.as_bytes())?;
            encoder.finish()?;
        } else {
            std::fs::write(&target, content.as_bytes())?;
        }

        let bytes_written = std::fs::metadata(&target)?.len();
        let result = ExportResult {
            path: target,
            bytes_written,
            records_exported: records.len(),
            duration_ms: (Utc::now() - started).num_milliseconds(),
        };
        tracing::info!(
            path = %result.path.display(),
            records = result.records_exported,
            bytes = result.bytes_written,
            "Export finished"
        );
        Ok(result)
    }

    /// Render matching records to a string (no file involved)
    pub async fn export_to_string(&self, options: &ExportOptions) -> Result<(String, usize)> {
        let records = self.store.list_records(&options.query).await?;
        let content = self.render(&records, options.format)?;
        Ok((content, records.len()))
    }

    fn render(&self, records: &[ExecutionRecord], format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
            ExportFormat::JsonCompact => Ok(serde_json::to_string(records)?),
            ExportFormat::Jsonl => {
                let mut out = String::new();
                for record in records {
                    out.push_str(&serde_json::to_string(record)?);
                    out.push('\n');
                }
                Ok(out)
            }
            ExportFormat::Csv => Ok(render_csv(records)),
            ExportFormat::Parquet => {
                tracing::warn!("Columnar export backend unavailable, falling back to JSON");
                Ok(serde_json::to_string_pretty(records)?)
            }
        }
    }
}

fn truncate_text(text: &str) -> &str {
    if text.len() <= CSV_TEXT_LIMIT {
        return text;
    }
    let mut end = CSV_TEXT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(records: &[ExecutionRecord]) -> String {
    let mut out = String::from(
        "id,persona_id,status,created_at,completed_at,duration_ms,input_text,output_summary,failure_reason,token_count,cost_usd,tags\n",
    );
    for record in records {
        let row = [
            record.id.to_string(),
            record.persona_id.clone(),
            record.status.as_str().to_string(),
            record.created_at.to_rfc3339(),
            record
                .completed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            record
                .duration_ms
                .map(|d| d.to_string())
                .unwrap_or_default(),
            truncate_text(&record.input_text).to_string(),
            truncate_text(&record.output_summary).to_string(),
            record.failure_reason.clone().unwrap_or_default(),
            record
                .token_count
                .map(|t| t.to_string())
                .unwrap_or_default(),
            record.cost_usd.map(|c| c.to_string()).unwrap_or_default(),
            record.tags.join(";"),
        ];
        let line: Vec<String> = row.iter().map(|cell| csv_escape(cell)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionStatus;
    use crate::store::MemoryHistoryStore;
    use std::sync::Arc;

    async fn service_with_records(n: usize) -> ExportService {
        let store = Arc::new(MemoryHistoryStore::new());
        for i in 0..n {
            let mut record = ExecutionRecord::for_persona("exporter");
            record.status = ExecutionStatus::Success;
            record.input_text = format!("input {i}, with a comma");
            record.output_summary = "x".repeat(2000);
            store.store_execution(record).await.unwrap();
        }
        ExportService::new(store)
    }

    #[tokio::test]
    async fn test_json_and_jsonl_rendering() {
        let service = service_with_records(3).await;

        let (json, count) = service
            .export_to_string(&ExportOptions::default())
            .await
            .unwrap();
        assert_eq!(count, 3);
        let parsed: Vec<ExecutionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 3);

        let (jsonl, _) = service
            .export_to_string(&ExportOptions {
                format: ExportFormat::Jsonl,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(jsonl.trim().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_csv_truncates_and_escapes() {
        let service = service_with_records(1).await;
        let (csv, _) = service
            .export_to_string(&ExportOptions {
                format: ExportFormat::Csv,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,persona_id,status"));
        let row = lines.next().unwrap();
        // Comma-bearing input is quoted; long summary is truncated
        assert!(row.contains("\"input 0, with a comma\""));
        assert!(row.len() < 2500);
    }

    #[tokio::test]
    async fn test_export_to_file_and_gzip() {
        let service = service_with_records(2).await;
        let dir = tempfile::tempdir().unwrap();

        let plain = service
            .export_to_file(&dir.path().join("out.json"), &ExportOptions::default())
            .await
            .unwrap();
        assert_eq!(plain.records_exported, 2);
        assert!(plain.bytes_written > 0);
        assert!(plain.path.exists());

        let zipped = service
            .export_to_file(
                &dir.path().join("out2.json"),
                &ExportOptions {
                    gzip: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(zipped.path.to_string_lossy().ends_with(".json.gz"));
        assert!(zipped.bytes_written > 0);
        assert!(zipped.bytes_written < plain.bytes_written);
    }

    #[tokio::test]
    async fn test_parquet_falls_back_to_json() {
        let service = service_with_records(1).await;
        let (content, _) = service
            .export_to_string(&ExportOptions {
                format: ExportFormat::Parquet,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(serde_json::from_str::<Vec<ExecutionRecord>>(&content).is_ok());
    }
}
