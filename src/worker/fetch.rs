use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::outcome::{Capture, ExecutionOutcome};
use crate::config::ExecutionConfig;

/// Issues the task's command as an HTTP GET instead of spawning a process.
///
/// A 2xx response is success with the body as output. Any other response
/// reports the HTTP status code as the task status. The body is written to
/// the task's log file in full and captured up to the output limit.
#[derive(Debug, Clone)]
pub struct FetchRunner {
    client: reqwest::Client,
    max_output_bytes: usize,
}

impl FetchRunner {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn with_client(client: reqwest::Client, config: &ExecutionConfig) -> Self {
        Self {
            client,
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub async fn run(
        &self,
        url: &str,
        log_file: &Path,
        deadline: Option<Duration>,
    ) -> ExecutionOutcome {
        let mut sink = match File::create(log_file).await {
            Ok(file) => file,
            Err(e) => {
                return ExecutionOutcome::error(format!(
                    "failed to open log file {}: {}",
                    log_file.display(),
                    e
                ))
            }
        };

        let mut request = self.client.get(url.trim());
        if let Some(bound) = deadline {
            request = request.timeout(bound);
        }
        let secs = deadline.map(|d| d.as_secs()).unwrap_or_default();

        let mut response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ExecutionOutcome::timed_out(String::new(), secs),
            Err(e) => return ExecutionOutcome::error(format!("request to {} failed: {}", url.trim(), e)),
        };
        let status = response.status();

        let mut body = Capture::default();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = sink.write_all(&chunk).await {
                        return ExecutionOutcome::error(format!("failed to write log file: {}", e));
                    }
                    body.push(&chunk, self.max_output_bytes);
                }
                Ok(None) => break,
                Err(e) if e.is_timeout() => {
                    return ExecutionOutcome::timed_out(body.into_string(), secs)
                }
                Err(e) => {
                    return ExecutionOutcome::failure(
                        i64::from(status.as_u16()),
                        body.into_string(),
                        format!("failed to read response body: {}", e),
                    )
                }
            }
        }
        if let Err(e) = sink.flush().await {
            return ExecutionOutcome::error(format!("failed to write log file: {}", e));
        }

        if status.is_success() {
            ExecutionOutcome::success(body.into_string())
        } else {
            ExecutionOutcome::failure(
                i64::from(status.as_u16()),
                body.into_string(),
                format!("HTTP status {}", status),
            )
        }
    }
}
