//! Content-Length framing for the ROM socket.
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Header names match case-insensitively; bare `\n` line endings are accepted.

use std::io::{BufRead, Read, Write};

use anyhow::{anyhow, bail, Context, Result};

/// Largest body accepted from the server (100 MiB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// Read one framed message body.
///
/// Returns `Ok(None)` on a clean EOF before any header byte, so the reader
/// loop can tell an orderly shutdown from a truncated frame.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let Some(size) = read_headers(reader)? else {
        return Ok(None);
    };

    let mut body = vec![0u8; size];
    reader
        .read_exact(&mut body)
        .with_context(|| format!("Frame body shorter than the announced {} bytes", size))?;

    String::from_utf8(body)
        .map(Some)
        .context("Frame body is not UTF-8")
}

/// Consume the header block and return the announced body length.
fn read_headers<R: BufRead>(reader: &mut R) -> Result<Option<usize>> {
    let mut length = None;
    let mut line = String::new();
    let mut first = true;

    loop {
        line.clear();
        if reader.read_line(&mut line).context("Failed to read frame header")? == 0 {
            if first {
                return Ok(None);
            }
            bail!("Connection closed in the middle of a frame");
        }
        first = false;

        let header = line.trim();
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            let parsed: usize = value
                .parse()
                .with_context(|| format!("Invalid Content-Length value: {}", value))?;
            length = Some(parsed);
        }
    }

    let size = length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
    if size > MAX_MESSAGE_SIZE {
        bail!("Message size {} exceeds maximum {} bytes", size, MAX_MESSAGE_SIZE);
    }
    Ok(Some(size))
}

/// Write `body` as one frame and flush it.
pub fn write_message<W: Write>(writer: &mut W, body: &str) -> Result<()> {
    write!(writer, "{}: {}\r\n\r\n", CONTENT_LENGTH, body.len())
        .and_then(|()| writer.write_all(body.as_bytes()))
        .and_then(|()| writer.flush())
        .context("Failed to write frame")
}
