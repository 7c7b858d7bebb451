use crate::frame::Frame;
use crate::message::Message;
use crate::types::{Result, StreamId};

/// Everything a connection can tell its embedder. Implement only what you
/// use; every method defaults to a no-op.
///
/// Hooks run synchronously inside whichever `Connection` call produced them,
/// and any hook may abort that call by returning an error, which propagates
/// to the caller unchanged. Payload borrows are only valid for the duration
/// of the call.
///
/// Ordering guarantees, per stream: `on_stream_start` precedes every other
/// event for that id; `on_message_head` precedes its `on_message_data` and
/// `on_message_tail`; `on_message_tail` precedes `on_stream_end`.
pub trait Events {
    /// Serialized output for the transport. The buffers form one logical
    /// write: deliver them back-to-back, in order.
    fn on_writev(&mut self, buffers: &[&[u8]]) -> Result<()> {
        let _ = buffers;
        Ok(())
    }

    fn on_stream_start(&mut self, id: StreamId) -> Result<()> {
        let _ = id;
        Ok(())
    }

    fn on_stream_end(&mut self, id: StreamId) -> Result<()> {
        let _ = id;
        Ok(())
    }

    fn on_message_head(&mut self, id: StreamId, msg: &Message) -> Result<()> {
        let _ = (id, msg);
        Ok(())
    }

    /// A server push: `msg` is the promised request, delivered on `promised`.
    fn on_message_push(&mut self, id: StreamId, msg: &Message, promised: StreamId) -> Result<()> {
        let _ = (id, msg, promised);
        Ok(())
    }

    fn on_message_data(&mut self, id: StreamId, data: &[u8]) -> Result<()> {
        let _ = (id, data);
        Ok(())
    }

    /// End of a message; `trailers` is present only when the peer sent some.
    fn on_message_tail(&mut self, id: StreamId, trailers: Option<&Message>) -> Result<()> {
        let _ = (id, trailers);
        Ok(())
    }

    /// Observability hook: every inbound h2 frame, before its handler runs.
    fn on_frame(&mut self, frame: &Frame) -> Result<()> {
        let _ = frame;
        Ok(())
    }

    /// The peer's SETTINGS were applied and acknowledged.
    fn on_settings(&mut self) -> Result<()> {
        Ok(())
    }

    /// More send window is available; id 0 means the connection-level window.
    fn on_flow_increase(&mut self, id: StreamId) -> Result<()> {
        let _ = id;
        Ok(())
    }

    fn on_pong(&mut self, payload: [u8; 8]) -> Result<()> {
        let _ = payload;
        Ok(())
    }

    /// The current h1 request asked to switch protocols; fired right after
    /// its `on_message_head`.
    fn on_upgrade(&mut self) -> Result<()> {
        Ok(())
    }
}
