//! Append-only sample sink shared by all virtual users.
//!
//! Virtual users send samples over an unbounded channel. A single writer
//! task owns the output file, so each JSON line is written whole and lines
//! from different users never interleave. The writer also keeps every
//! sample in memory for threshold evaluation.

use mrb_common::LoadSample;
use mrb_common::dataset::load_sample_line;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cloneable handle used by virtual users to record samples.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::UnboundedSender<LoadSample>,
}

impl SampleSink {
    /// Record one sample. Never blocks.
    pub fn record(&self, sample: LoadSample) {
        if self.tx.send(sample).is_err() {
            warn!("Sample sink closed, dropping sample");
        }
    }
}

/// Everything the writer saw once all handles are dropped.
#[derive(Debug, Default)]
pub struct SinkReport {
    pub samples: Vec<LoadSample>,
    pub path: Option<PathBuf>,
    /// Samples that could not be written to the file (still kept in memory).
    pub write_errors: usize,
}

/// Owns the writer task. Await [`SinkWriter::finish`] after all
/// [`SampleSink`] clones are dropped.
pub struct SinkWriter {
    handle: JoinHandle<SinkReport>,
}

impl SinkWriter {
    pub async fn finish(self) -> SinkReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Sample writer task failed");
                SinkReport::default()
            }
        }
    }
}

/// Create a sink, optionally streaming JSON Lines to `path` (appended).
pub async fn open_sink(path: Option<&Path>) -> std::io::Result<(SampleSink, SinkWriter)> {
    let file = match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let path = path.map(Path::to_path_buf);
    let handle = tokio::spawn(write_samples(rx, file, path));
    Ok((SampleSink { tx }, SinkWriter { handle }))
}

async fn write_samples(
    mut rx: mpsc::UnboundedReceiver<LoadSample>,
    mut file: Option<BufWriter<tokio::fs::File>>,
    path: Option<PathBuf>,
) -> SinkReport {
    let mut report = SinkReport {
        path,
        ..Default::default()
    };

    while let Some(sample) = rx.recv().await {
        if let Some(writer) = file.as_mut() {
            let written = match load_sample_line(&sample) {
                Ok(line) => writer.write_all(line.as_bytes()).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = written {
                report.write_errors += 1;
                warn!(error = %e, "Failed to write load sample");
            }
        }
        report.samples.push(sample);
    }

    if let Some(writer) = file.as_mut()
        && let Err(e) = writer.flush().await
    {
        warn!(error = %e, "Failed to flush load samples");
        report.write_errors += 1;
    }
    debug!(samples = report.samples.len(), "Sample writer finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mrb_common::dataset::read_load_samples;
    use mrb_common::{Operation, RuntimeId};

    fn sample(i: usize) -> LoadSample {
        LoadSample {
            runtime_id: RuntimeId::new("python"),
            operation: Operation::ALL[i % Operation::ALL.len()],
            status_code: 200,
            duration_ms: i as f64,
            success: true,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_appends_produce_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/load-test-python.jsonl");
        let (sink, writer) = open_sink(Some(&path)).await.unwrap();

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    sink.record(sample(worker * 50 + i));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(sink);

        let report = writer.finish().await;
        assert_eq!(report.samples.len(), 400);
        assert_eq!(report.write_errors, 0);

        let ingested = read_load_samples(&path).unwrap();
        assert_eq!(ingested.rows.len(), 400);
        assert_eq!(ingested.malformed, 0);
    }

    #[tokio::test]
    async fn test_memory_only_sink() {
        let (sink, writer) = open_sink(None).await.unwrap();
        sink.record(sample(1));
        drop(sink);
        let report = writer.finish().await;
        assert_eq!(report.samples.len(), 1);
        assert!(report.path.is_none());
    }
}
