use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Status reported when the command could not be run at all (spawn failure,
/// empty command, log file problems, fetch transport errors).
pub const STATUS_ERROR: i64 = 10002;

/// Status reported when the command exceeded its deadline.
pub const STATUS_TIMEOUT: i64 = 10003;

/// Appended to a capture that hit the in-memory limit.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Result of one execution attempt.
///
/// `err` is `Some` exactly when `code` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub host: String,
    pub code: i64,
    pub result: String,
    pub err: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(result: String) -> Self {
        Self {
            host: String::new(),
            code: 0,
            result,
            err: None,
        }
    }

    /// A failed outcome. A zero `code` is coerced to [`STATUS_ERROR`] so a
    /// populated error never travels with a success status.
    pub fn failure(code: i64, result: String, err: impl Into<String>) -> Self {
        let err = err.into();
        Self {
            host: String::new(),
            code: if code == 0 { STATUS_ERROR } else { code },
            result,
            err: Some(if err.is_empty() {
                format!("exit status {}", code)
            } else {
                err
            }),
        }
    }

    pub fn error(err: impl Into<String>) -> Self {
        Self::failure(STATUS_ERROR, String::new(), err)
    }

    pub fn timed_out(result: String, after_secs: u64) -> Self {
        Self::failure(
            STATUS_TIMEOUT,
            result,
            format!("execution timed out after {}s", after_secs),
        )
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == 0 && self.err.is_none()
    }

    pub fn is_timeout(&self) -> bool {
        self.code == STATUS_TIMEOUT
    }

    /// Error text as it appears on the wire: empty on success.
    pub fn err_text(&self) -> &str {
        self.err.as_deref().unwrap_or("")
    }
}

/// Bytes read from a stream, capped in memory.
#[derive(Debug, Default)]
pub struct Capture {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl Capture {
    pub fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Drain `reader` to EOF into `capture`, copying every byte into `sink` (when
/// given) and keeping at most `limit` bytes in memory.
///
/// Bytes read so far stay in `capture` if the future is dropped early.
pub async fn capture_stream<R, W>(
    mut reader: R,
    mut sink: Option<&mut W>,
    limit: usize,
    capture: &mut Capture,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(sink) = sink.as_deref_mut() {
            sink.write_all(&buf[..n]).await?;
        }
        capture.push(&buf[..n], limit);
    }
    if let Some(sink) = sink {
        sink.flush().await?;
    }
    Ok(())
}
