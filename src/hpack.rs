//! Handles onto the header-compression collaborator. The engine never touches
//! HPACK bit layouts itself; it only owns the per-connection encoder/decoder
//! state and the dynamic-table limits the SETTINGS exchange negotiates.

use crate::message::Header;
use bytes::Bytes;
use std::fmt;

pub(crate) struct HeaderEncoder {
    inner: hpack::Encoder<'static>,
    // The bundled encoder only emits literal representations and never grows
    // its dynamic table, so the negotiated cap is bookkeeping.
    limit: usize,
}

impl HeaderEncoder {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: hpack::Encoder::new(),
            limit,
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    #[allow(dead_code)]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn encode(&mut self, headers: &[Header]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|h| (h.name.as_ref(), h.value.as_ref()))
            .collect();
        self.inner.encode(pairs)
    }
}

impl fmt::Debug for HeaderEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderEncoder")
            .field("limit", &self.limit)
            .finish()
    }
}

/// Raised when a header block does not decode; the connection must answer
/// with GOAWAY(COMPRESSION_ERROR) since the shared table is now suspect.
#[derive(Debug)]
pub(crate) struct HeaderDecodeError;

pub(crate) struct HeaderDecoder {
    inner: hpack::Decoder<'static>,
}

impl HeaderDecoder {
    pub fn new(limit: usize) -> Self {
        let mut inner = hpack::Decoder::new();
        inner.set_max_table_size(limit);
        Self { inner }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.inner.set_max_table_size(limit);
    }

    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<Header>, HeaderDecodeError> {
        let pairs = self.inner.decode(block).map_err(|_| HeaderDecodeError)?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| Header {
                name: Bytes::from(name),
                value: Bytes::from(value),
            })
            .collect())
    }
}

impl fmt::Debug for HeaderDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderDecoder").finish()
    }
}
