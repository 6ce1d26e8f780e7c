use std::io;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::messages::Request;
use super::{MAX_DAP_HEADER_LINE_BYTES, MAX_DAP_MESSAGE_BYTES};

#[derive(Debug, Error)]
pub enum DapError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(String),

    #[error("dap protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for DapError {
    fn from(err: serde_json::Error) -> Self {
        DapError::Json(sanitize_json_error_message(&err.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, DapError>;

/// Redacts user-provided scalar values from a `serde_json` error message.
///
/// DAP payloads carry launch arguments and evaluated expressions, so decode
/// errors must not echo them back into logs or responses.
pub(crate) fn sanitize_json_error_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find('"') {
        out.push_str(&rest[..start + 1]);
        rest = &rest[start + 1..];

        let Some(end) = rest.find('"') else {
            out.push_str(rest);
            return out;
        };
        out.push_str("<redacted>\"");
        rest = &rest[end + 1..];
    }
    out.push_str(rest);

    // `unknown field `secret`, expected ...`: only the first backticked segment
    // is user input.
    if let Some(start) = out.find('`') {
        if let Some(end_rel) = out[start + 1..].find('`') {
            let end = start + 1 + end_rel;
            out.replace_range(start + 1..end, "<redacted>");
        }
    }

    out
}

async fn read_line_limited<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> io::Result<Option<String>> {
    let mut buf = Vec::<u8>::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }

        let newline_pos = available.iter().position(|&b| b == b'\n');
        let take = newline_pos.map(|pos| pos + 1).unwrap_or(available.len());
        if buf.len() + take > max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("DAP header line exceeds maximum size ({max_len} bytes)"),
            ));
        }

        buf.extend_from_slice(&available[..take]);
        reader.consume(take);
        if newline_pos.is_some() {
            break;
        }
    }

    let line = String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "DAP header line is not UTF-8"))?;
    Ok(Some(line))
}

/// Reads `Content-Length` framed JSON messages:
///
/// ```text
/// Content-Length: 123\r\n
/// \r\n
/// { ...json... }
/// ```
pub struct DapReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> DapReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Returns `Ok(None)` on a clean EOF between messages.
    pub async fn read_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let mut content_length: Option<usize> = None;
        let mut saw_header_line = false;

        loop {
            let Some(line) = read_line_limited(&mut self.reader, MAX_DAP_HEADER_LINE_BYTES).await?
            else {
                if !saw_header_line {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF while reading DAP headers",
                )
                .into());
            };
            saw_header_line = true;

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("Content-Length") {
                    let value = value.trim();
                    content_length = Some(value.parse::<usize>().map_err(|err| {
                        DapError::Protocol(format!("invalid Content-Length {value:?}: {err}"))
                    })?);
                }
            }
        }

        let Some(content_length) = content_length else {
            return Err(DapError::Protocol(
                "DAP message missing Content-Length header".to_string(),
            ));
        };

        if content_length > MAX_DAP_MESSAGE_BYTES {
            return Err(DapError::Protocol(format!(
                "DAP message Content-Length {content_length} exceeds maximum allowed size {MAX_DAP_MESSAGE_BYTES}"
            )));
        }

        let mut buf = vec![0u8; content_length];
        self.reader.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }

    pub async fn read_value(&mut self) -> Result<Option<Value>> {
        let Some(bytes) = self.read_raw().await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        let Some(value) = self.read_value().await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value::<Request>(value)?))
    }
}

pub struct DapWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> DapWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_value(&mut self, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n", bytes.len()).as_bytes())
            .await?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
