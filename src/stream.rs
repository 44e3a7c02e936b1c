//! Line-delimited JSON inference over a bounded queue.
//!
//! A reader task parses one request per line and forwards it through a
//! bounded channel; the worker runs requests in arrival order against a
//! single service and writes one response (or error object) per line.

use kestrel_filter::inference::{InferenceRequest, InferenceService};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

enum Job {
    Request(InferenceRequest),
    Malformed { line: u64, reason: String },
}

#[derive(Serialize)]
struct ErrorLine<'a> {
    id: Option<&'a str>,
    error: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub processed: u64,
    pub failed: u64,
}

/// Serve requests from `reader` until end of input.
pub async fn run<R, W>(
    mut service: InferenceService,
    reader: R,
    writer: &mut W,
    capacity: usize,
) -> anyhow::Result<StreamSummary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

    let reader_task = tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut line_no: u64 = 0;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("stream: read failed after line {line_no}: {e}");
                    break;
                }
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let job = match serde_json::from_str::<InferenceRequest>(&line) {
                Ok(request) => Job::Request(request),
                Err(e) => Job::Malformed {
                    line: line_no,
                    reason: e.to_string(),
                },
            };
            if tx.send(job).await.is_err() {
                info!("stream worker dropped, stopping reader");
                break;
            }
        }
    });

    let mut summary = StreamSummary::default();
    while let Some(job) = rx.recv().await {
        let out = match job {
            Job::Request(request) => match service.infer(&request) {
                Ok(response) => {
                    summary.processed += 1;
                    serde_json::to_string(&response)?
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("stream: request {:?} failed: {e}", request.id);
                    serde_json::to_string(&ErrorLine {
                        id: request.id.as_deref(),
                        error: e.to_string(),
                    })?
                }
            },
            Job::Malformed { line, reason } => {
                summary.failed += 1;
                warn!("stream: line {line} is not a request: {reason}");
                serde_json::to_string(&ErrorLine {
                    id: None,
                    error: format!("line {line}: {reason}"),
                })?
            }
        };
        writer.write_all(out.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    reader_task.await?;

    info!(
        "stream finished: {} processed, {} failed",
        summary.processed, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::config::Config;
    use std::io::Cursor;

    fn service() -> InferenceService {
        let mut service = InferenceService::new(Config::default());
        service.load().unwrap();
        service
    }

    fn request_line(id: &str, n: usize) -> String {
        let series = |v: f64| vec![v; n];
        serde_json::json!({
            "id": id,
            "inputs": [
                {"name": "memory_utilization", "data": series(0.5)},
                {"name": "load_average_15m", "data": series(1.0)},
                {"name": "load_average_1m", "data": series(2.0)},
            ]
        })
        .to_string()
    }

    fn output_lines(out: Vec<u8>) -> Vec<serde_json::Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_stream_answers_in_order() {
        let input = format!(
            "{}\n\n{}\n{}\n",
            request_line("a", 4),
            request_line("b", 2),
            request_line("c", 7)
        );
        let mut out = Vec::new();
        let summary = run(service(), Cursor::new(input.into_bytes()), &mut out, 2)
            .await
            .unwrap();
        assert_eq!(summary, StreamSummary { processed: 3, failed: 0 });

        let lines = output_lines(out);
        let ids: Vec<&str> = lines.iter().map(|l| l["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(lines[2]["outputs"][0]["data"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_stream_reports_bad_lines_and_continues() {
        let bad_arity = serde_json::json!({
            "id": "short",
            "inputs": [{"name": "memory_utilization", "data": [0.5]}]
        })
        .to_string();
        let input = format!("not json\n{bad_arity}\n{}\n", request_line("ok", 3));
        let mut out = Vec::new();
        let summary = run(service(), Cursor::new(input.into_bytes()), &mut out, 64)
            .await
            .unwrap();
        assert_eq!(summary, StreamSummary { processed: 1, failed: 2 });

        let lines = output_lines(out);
        assert_eq!(lines.len(), 3);
        assert!(lines[0]["id"].is_null());
        assert!(lines[0]["error"].as_str().unwrap().starts_with("line 1"));
        assert_eq!(lines[1]["id"], "short");
        assert!(lines[1]["error"].is_string());
        assert_eq!(lines[2]["id"], "ok");
    }

    #[tokio::test]
    async fn test_stream_unloaded_service_fails_every_request() {
        let service = InferenceService::new(Config::default());
        let input = format!("{}\n", request_line("x", 2));
        let mut out = Vec::new();
        let summary = run(service, Cursor::new(input.into_bytes()), &mut out, 4)
            .await
            .unwrap();
        assert_eq!(summary, StreamSummary { processed: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_stream_empty_input() {
        let mut out = Vec::new();
        let summary = run(service(), Cursor::new(Vec::new()), &mut out, 4)
            .await
            .unwrap();
        assert_eq!(summary, StreamSummary::default());
        assert!(out.is_empty());
    }
}
