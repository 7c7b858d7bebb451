use crate::types::StreamId;

/// Where one direction of a stream is in its life: waiting for the head,
/// moving the body, or done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum HalfState {
    Headers,
    Data,
    Closed,
}

/// Per-stream record. Window fields are deltas relative to the applicable
/// settings' initial window size, signed so transient over/underflow from
/// SETTINGS changes is representable.
#[derive(Debug)]
pub(crate) struct Stream {
    pub id: StreamId,
    pub r_state: HalfState,
    pub w_state: HalfState,
    /// h1 only: the body is being written with chunked framing.
    pub writing_chunked: bool,
    /// The outgoing message was a HEAD request, so the response head declares
    /// a body that will never arrive.
    pub reading_head_response: bool,
    pub window_recv: i64,
    pub window_send: i64,
    /// Declared content length still expected on the read side; `None` when
    /// no length was declared.
    pub remaining_payload: Option<u64>,
}

impl Stream {
    pub fn new(id: StreamId, local: bool) -> Self {
        // A push-promised stream is born half-closed: the reserving side only
        // ever writes it, the other side only reads it.
        Self {
            id,
            r_state: if id % 2 == 1 || !local {
                HalfState::Headers
            } else {
                HalfState::Closed
            },
            w_state: if id % 2 == 1 || local {
                HalfState::Headers
            } else {
                HalfState::Closed
            },
            writing_chunked: false,
            reading_head_response: false,
            window_recv: 0,
            window_send: 0,
            remaining_payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_streams_open_both_halves() {
        let stream = Stream::new(1, true);
        assert_eq!(stream.r_state, HalfState::Headers);
        assert_eq!(stream.w_state, HalfState::Headers);
    }

    #[test]
    fn promised_streams_are_half_closed() {
        // Reserved by us (a server push): write-only.
        let local = Stream::new(2, true);
        assert_eq!(local.r_state, HalfState::Closed);
        assert_eq!(local.w_state, HalfState::Headers);

        // Reserved by the peer: read-only.
        let remote = Stream::new(2, false);
        assert_eq!(remote.r_state, HalfState::Headers);
        assert_eq!(remote.w_state, HalfState::Closed);
    }
}
