//! Adapter over the HTTP/1 head tokenizer plus the pieces of HTTP/1 body
//! framing the state machine needs: the chunk-size line grammar and the
//! `transfer-encoding` token surgery shared by the read and write paths.

use crate::message::MAX_HEADERS;
use crate::types::{Error, Result};
use bytes::Bytes;

/// A fully tokenized h1 head. Header names are exactly as received; the
/// connection folds and validates them afterwards so both directions share
/// one rule set.
#[derive(Debug)]
pub(crate) struct RawHead {
    pub consumed: usize,
    pub minor: u8,
    pub code: u32,
    pub method: Bytes,
    pub path: Bytes,
    pub headers: Vec<(Bytes, Bytes)>,
}

fn copy_headers(headers: &[httparse::Header<'_>]) -> Vec<(Bytes, Bytes)> {
    headers
        .iter()
        .map(|h| {
            (
                Bytes::copy_from_slice(h.name.as_bytes()),
                Bytes::copy_from_slice(h.value),
            )
        })
        .collect()
}

/// Tokenizes a request head off the front of `buf`. `None` means the head is
/// not fully buffered yet.
pub(crate) fn parse_request(buf: &[u8]) -> Result<Option<RawHead>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(buf) {
        Ok(httparse::Status::Complete(consumed)) => Ok(Some(RawHead {
            consumed,
            minor: request.version.unwrap_or(1),
            code: 0,
            method: Bytes::copy_from_slice(request.method.unwrap_or("").as_bytes()),
            path: Bytes::copy_from_slice(request.path.unwrap_or("").as_bytes()),
            headers: copy_headers(request.headers),
        })),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::Protocol("bad HTTP/1.x message")),
    }
}

/// Tokenizes a response head. The reason phrase is dropped; the message model
/// does not carry one.
pub(crate) fn parse_response(buf: &[u8]) -> Result<Option<RawHead>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(buf) {
        Ok(httparse::Status::Complete(consumed)) => Ok(Some(RawHead {
            consumed,
            minor: response.version.unwrap_or(1),
            code: u32::from(response.code.unwrap_or(0)),
            method: Bytes::new(),
            path: Bytes::new(),
            headers: copy_headers(response.headers),
        })),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::Protocol("bad HTTP/1.x message")),
    }
}

/// Length of `value` once a trailing `chunked` token (plus surrounding
/// list separators) is dropped. In a valid message chunked can only be the
/// last transfer-encoding, so suffix surgery is enough.
pub(crate) fn strip_chunked_token(value: &[u8]) -> usize {
    let mut keep = value.len();
    if value.ends_with(b"chunked") {
        keep -= 7;
        while keep > 0 && value[keep - 1] == b' ' {
            keep -= 1;
        }
        if keep > 0 && value[keep - 1] == b',' {
            keep -= 1;
        }
    }
    keep
}

/// Outcome of reading one chunk-size line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkSize {
    /// No full line buffered yet.
    Incomplete,
    /// A line of `consumed` octets declaring `size` payload octets.
    Line { consumed: usize, size: u64 },
}

/// Parses `SIZE-hex [;extension] CRLF` off the front of `buf`. With an
/// extension present the line ends at the next LF; without one the CRLF must
/// be immediate and exact.
pub(crate) fn parse_chunk_size(buf: &[u8]) -> Result<ChunkSize> {
    let Some(eol) = buf.iter().position(|&b| b == b'\n') else {
        return Ok(ChunkSize::Incomplete);
    };
    let mut size: u64 = 0;
    let mut i = 0;
    let digit_end = loop {
        match buf[i] {
            b'\r' | b'\n' | b';' => break i,
            octet => {
                let digit = match octet {
                    b'0'..=b'9' => u64::from(octet - b'0'),
                    b'a'..=b'f' => u64::from(octet - b'a' + 10),
                    b'A'..=b'F' => u64::from(octet - b'A' + 10),
                    _ => return Err(Error::Protocol("invalid h1 chunk length")),
                };
                size = size
                    .checked_mul(16)
                    .and_then(|s| s.checked_add(digit))
                    .ok_or(Error::Protocol("invalid h1 chunk length"))?;
                i += 1;
            }
        }
    };
    let consumed = if buf[digit_end] == b';' {
        eol + 1
    } else if buf[digit_end] == b'\r' && buf.get(digit_end + 1) == Some(&b'\n') {
        digit_end + 2
    } else {
        return Err(Error::Protocol("invalid h1 line separator"));
    };
    Ok(ChunkSize::Line { consumed, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_head_parses() {
        let head = parse_request(b"GET /x HTTP/1.1\r\nHost: a\r\n\r\nrest")
            .unwrap()
            .unwrap();
        assert_eq!(head.consumed, 28);
        assert_eq!(head.minor, 1);
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/x");
        assert_eq!(head.headers.len(), 1);
        assert_eq!(head.headers[0].0, "Host");
    }

    #[test]
    fn partial_head_waits() {
        assert!(parse_request(b"GET / HTTP/1.1\r\nHost:").unwrap().is_none());
        assert!(parse_response(b"HTTP/1.1 20").unwrap().is_none());
    }

    #[test]
    fn malformed_head_rejects() {
        assert!(parse_request(b"GET\x01 / HTTP/1.1\r\n\r\n").is_err());
    }

    #[test]
    fn response_head_parses() {
        let head = parse_response(b"HTTP/1.0 204 No Content\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(head.minor, 0);
        assert_eq!(head.code, 204);
    }

    #[test]
    fn chunked_token_is_stripped() {
        assert_eq!(strip_chunked_token(b"chunked"), 0);
        assert_eq!(strip_chunked_token(b"gzip, chunked"), 4);
        assert_eq!(strip_chunked_token(b"gzip , chunked"), 4);
        assert_eq!(strip_chunked_token(b"gzip"), 4);
    }

    #[test]
    fn chunk_size_lines() {
        assert_eq!(parse_chunk_size(b"5\r\nhello"), Ok(ChunkSize::Line { consumed: 3, size: 5 }));
        assert_eq!(parse_chunk_size(b"1aB\r\n"), Ok(ChunkSize::Line { consumed: 5, size: 0x1AB }));
        assert_eq!(parse_chunk_size(b"0\r\n"), Ok(ChunkSize::Line { consumed: 3, size: 0 }));
        assert_eq!(
            parse_chunk_size(b"5;ext=1\r\nhello"),
            Ok(ChunkSize::Line { consumed: 9, size: 5 })
        );
        assert_eq!(parse_chunk_size(b"5"), Ok(ChunkSize::Incomplete));
        assert_eq!(parse_chunk_size(b""), Ok(ChunkSize::Incomplete));
    }

    #[test]
    fn chunk_size_rejects_junk() {
        assert!(parse_chunk_size(b"5x\r\n").is_err());
        // Bare LF is only tolerated after an extension.
        assert!(parse_chunk_size(b"5\n").is_err());
        assert!(parse_chunk_size(b"FFFFFFFFFFFFFFFFF\r\n").is_err());
    }
}
