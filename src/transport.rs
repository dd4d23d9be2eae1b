//! Line-oriented connection primitive: header blocks, raw bodies, command writes.

use std::collections::HashMap;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use crate::{
    constants::MAX_LINE_LENGTH,
    error::{EslError, EslResult},
};

/// Envelope headers of one message (the MIME-style block before the body).
///
/// Lookups are ASCII case-insensitive; names keep the spelling the server
/// sent. When a name repeats, the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, String>,
}

impl Headers {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(value) = self
            .entries
            .get(name)
        {
            return Some(value.as_str());
        }
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add a header unless one with the same name is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self
            .get(&name)
            .is_none()
        {
            self.entries
                .insert(name, value.into());
        }
    }

    /// Iterate over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries
            .len()
    }

    /// `true` when the block was empty.
    pub fn is_empty(&self) -> bool {
        self.entries
            .is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Split one `Key: Value` header line.
fn parse_header_line(line: &str) -> EslResult<(&str, &str)> {
    let malformed = || EslError::MalformedHeader {
        line: line.to_string(),
    };
    let (key, value) = line
        .split_once(':')
        .ok_or_else(malformed)?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(malformed());
    }
    Ok((key, value.trim()))
}

/// Buffered stream reading lines, header blocks and length-delimited bodies.
///
/// Generic over the stream so TCP sockets and in-memory pipes share the same
/// code path.
#[derive(Debug)]
pub(crate) struct LineConnection<S> {
    stream: BufReader<S>,
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Read one line, without its `\n` or `\r\n` terminator.
    pub(crate) async fn read_line(&mut self) -> EslResult<String> {
        let mut buf = Vec::new();
        let n = (&mut self.stream)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut buf)
            .await?;

        if n == 0 {
            return Err(EslError::ConnectionClosed);
        }
        if buf.last() != Some(&b'\n') {
            if n >= MAX_LINE_LENGTH {
                return Err(EslError::MalformedHeader {
                    line: format!("<line exceeds {} bytes>", MAX_LINE_LENGTH),
                });
            }
            return Err(EslError::ConnectionClosed);
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        String::from_utf8(buf).map_err(|e| EslError::MalformedHeader {
            line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Read `Key: Value` lines up to and including the terminating blank line.
    pub(crate) async fn read_header_block(&mut self) -> EslResult<Headers> {
        let mut headers = Headers::new();
        loop {
            let line = self
                .read_line()
                .await?;
            if line.is_empty() {
                trace!("[RECV] Header block complete ({} headers)", headers.len());
                return Ok(headers);
            }
            let (key, value) = parse_header_line(&line)?;
            headers.insert(key, value);
        }
    }

    /// Read exactly `len` raw bytes.
    pub(crate) async fn read_body(&mut self, len: usize) -> EslResult<Vec<u8>> {
        let mut body = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self
                .stream
                .read(&mut body[filled..])
                .await
            {
                Ok(0) => {
                    return Err(EslError::TruncatedBody {
                        expected: len,
                        received: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) => {
                    debug!("[RECV] Body read failed after {} bytes: {}", filled, e);
                    return Err(EslError::TruncatedBody {
                        expected: len,
                        received: filled,
                    });
                }
            }
        }
        trace!("[RECV] Read {} byte body", len);
        Ok(body)
    }

    /// Write a fully formatted command and flush it.
    pub(crate) async fn send(&mut self, data: &str) -> EslResult<()> {
        self.stream
            .write_all(data.as_bytes())
            .await?;
        self.stream
            .flush()
            .await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    pub(crate) async fn shutdown(&mut self) -> EslResult<()> {
        self.stream
            .shutdown()
            .await?;
        Ok(())
    }
}
