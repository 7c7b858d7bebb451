use crate::events::Events;
use crate::flags::FrameFlags;
use crate::frame::{Frame, FrameHeader, FRAME_HEADER_LEN};
use crate::h1;
use crate::hpack::{HeaderDecoder, HeaderEncoder};
use crate::message::{self, Header, Message};
use crate::settings::Settings;
use crate::stream::HalfState;
use crate::stream_table::StreamTable;
use crate::types::{Error, ErrorType, FrameType, Result, StreamId};
use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace, warn};
use num_traits::FromPrimitive;

/// The magic a client opens every HTTP/2 connection with.
const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const UPGRADE_RESPONSE: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nconnection: upgrade\r\nupgrade: h2c\r\n\r\n";

/// How many CONTINUATION frames one header block may span before the peer is
/// told to calm down. Also bounds the buffered h1 head, to
/// `(MAX_CONTINUATIONS + 1) * max_frame_size` octets.
pub(crate) const MAX_CONTINUATIONS: usize = 4;

const MAX_WINDOW: i64 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Client,
    Server,
}

/// Protocol generation on the wire. A connection may begin in `Http1` and
/// move to `Http2` through an h2c upgrade or a prior-knowledge preface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Http1,
    Http2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    H2Init,
    H2Preface,
    H2Settings,
    H2Frame,
    H1Head,
    H1Body,
    H1Tail,
    H1Chunk,
    H1ChunkBody,
    H1ChunkTail,
    H1Trailers,
}

/// What a state handler decided: either wait for more input, or move on.
enum Control {
    NeedMore,
    Next(State),
}

/// How much h1 body is still expected on the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyLength {
    Sized(u64),
    Chunked,
    /// A 101 switched protocols; everything until EOF is payload.
    Tunnel,
}

/// A single HTTP/1.x or HTTP/2 connection, as a pure state machine. Feed it
/// transport bytes with [`consume`](Connection::consume); it parses, keeps
/// per-stream and flow-control state, reports what happened through the
/// [`Events`] sink it owns, and emits wire output through
/// [`Events::on_writev`]. It never touches a socket itself.
pub struct Connection<E: Events> {
    events: E,
    client: bool,
    mode: Mode,
    state: State,
    buffer: BytesMut,
    local_settings: Settings,
    remote_settings: Settings,
    encoder: HeaderEncoder,
    decoder: HeaderDecoder,
    window_recv: i64,
    window_send: i64,
    streams: StreamTable,
    /// Last-stream-id high-water mark of the first GOAWAY we sent.
    goaway_sent: Option<StreamId>,
    body_remaining: BodyLength,
    disallow_h2_upgrade: bool,
    disallow_h2_prior_knowledge: bool,
    manual_flow_control: bool,
}

impl<E: Events> Connection<E> {
    pub fn new(kind: Kind, events: E) -> Self {
        let standard = Settings::standard();
        let local = Settings::initial();
        Self {
            events,
            client: kind == Kind::Client,
            mode: Mode::Http1,
            state: State::Closed,
            buffer: BytesMut::new(),
            encoder: HeaderEncoder::new(standard.header_table_size() as usize),
            decoder: HeaderDecoder::new(local.header_table_size() as usize),
            window_recv: i64::from(standard.initial_window_size()),
            window_send: i64::from(standard.initial_window_size()),
            local_settings: local,
            remote_settings: Settings::conservative(),
            streams: StreamTable::default(),
            goaway_sent: None,
            body_remaining: BodyLength::Sized(0),
            disallow_h2_upgrade: true,
            disallow_h2_prior_knowledge: false,
            manual_flow_control: false,
        }
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        if self.client {
            Kind::Client
        } else {
            Kind::Server
        }
    }

    /// Refuse `Upgrade: h2c` requests (on by default; the inline
    /// `HTTP2-Settings` payload is not decoded).
    pub fn set_disallow_h2_upgrade(&mut self, disallow: bool) {
        self.disallow_h2_upgrade = disallow;
    }

    /// Refuse a prior-knowledge h2 preface on an h1 server connection.
    pub fn set_disallow_h2_prior_knowledge(&mut self, disallow: bool) {
        self.disallow_h2_prior_knowledge = disallow;
    }

    /// Leave stream-level receive windows to the application: the engine
    /// stops refilling them as data arrives, and the application returns
    /// credit with [`open_flow`](Connection::open_flow).
    pub fn set_manual_flow_control(&mut self, manual: bool) {
        self.manual_flow_control = manual;
    }

    /// Installs new local settings. Callable at any time; once in h2 mode the
    /// delta is announced to the peer immediately.
    pub fn configure(&mut self, settings: Settings) -> Result<()> {
        if settings.enable_push() > 1 {
            return Err(Error::Assertion("enable_push is a boolean"));
        }
        if !(16_384..=16_777_215).contains(&settings.max_frame_size()) {
            return Err(Error::Assertion("max_frame_size out of bounds (2^14..2^24-1)"));
        }
        if self.state != State::H2Init && self.mode == Mode::Http2 {
            // Before that point the H2Init handler announces the settings.
            let payload = settings.delta_from(&self.local_settings);
            self.frame_write(Frame::new(FrameType::Settings, FrameFlags::empty(), 0, payload))?;
        }
        self.decoder.set_limit(settings.header_table_size() as usize);
        self.local_settings = settings;
        Ok(())
    }

    /// Starts the connection in the given protocol mode. For h2 this emits
    /// the preface (clients) and the initial SETTINGS right away.
    pub fn begin(&mut self, mode: Mode) -> Result<()> {
        if self.state != State::Closed {
            return Err(Error::Assertion("begin called twice"));
        }
        self.state = if mode == Mode::Http2 {
            State::H2Init
        } else {
            State::H1Head
        };
        self.run()
    }

    /// Feeds transport bytes and drives the state machine until it needs
    /// more input. Any nonempty prefix/suffix split of the same byte stream
    /// produces the same events.
    pub fn consume(&mut self, data: &[u8]) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::Disconnect);
        }
        self.buffer.extend_from_slice(data);
        self.run()
    }

    /// The transport hit EOF. In h1 an unfinished inbound message makes this
    /// an unclean close; h2 never survives a half-closed transport.
    pub fn eof(&mut self) -> Result<()> {
        if self.mode != Mode::Http2 {
            let id = self.h1_stream_id();
            if self
                .streams
                .find(id)
                .map_or(false, |s| s.r_state != HalfState::Closed)
            {
                return Err(Error::Disconnect);
            }
            return Ok(());
        }
        self.state = State::Closed;
        for id in self.streams.ids() {
            self.stream_end(id)?;
        }
        Ok(())
    }

    /// Graceful local shutdown: a clean GOAWAY in h2, nothing on the wire in
    /// h1. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<()> {
        self.write_reset(0, ErrorType::NoError)
    }

    /// The id the next locally opened stream must use.
    #[must_use]
    pub fn next_stream_id(&self) -> StreamId {
        let last = self.streams.last_id(true);
        if self.client && last == 0 {
            1
        } else {
            last + 2
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            let control = match self.state {
                State::Closed => Ok(Control::NeedMore),
                State::H2Init => self.when_h2_init(),
                State::H2Preface => self.when_h2_preface(),
                State::H2Settings => self.when_h2_settings(),
                State::H2Frame => self.when_h2_frame(),
                State::H1Head => self.when_h1_head(),
                State::H1Body | State::H1ChunkBody => self.when_h1_body(),
                State::H1Tail => self.when_h1_tail(),
                State::H1Chunk => self.when_h1_chunk(),
                State::H1ChunkTail => self.when_h1_chunk_tail(),
                State::H1Trailers => self.when_h1_trailers(),
            }?;
            match control {
                Control::NeedMore => return Ok(()),
                Control::Next(next) => {
                    if next != self.state {
                        trace!("state {:?} -> {:?}", self.state, next);
                    }
                    self.state = next;
                }
            }
        }
    }

    // ---- streams ----

    fn stream_is_local(&self, id: StreamId) -> bool {
        // Clients own odd ids, servers even ones.
        (id % 2 == 1) == self.client
    }

    /// The stream the current h1 message travels on: the last one the client
    /// side opened.
    fn h1_stream_id(&self) -> StreamId {
        self.streams.last_id(self.client)
    }

    fn stream_new(&mut self, id: StreamId, local: bool) -> Result<()> {
        if self.stream_is_local(id) != local {
            return Err(if local {
                Error::InvalidStream("incorrect stream id parity")
            } else {
                Error::Protocol("incorrect stream id parity")
            });
        }
        if id <= self.streams.last_id(local) {
            return Err(if local {
                Error::InvalidStream("nonmonotonic stream id")
            } else {
                Error::Protocol("nonmonotonic stream id")
            });
        }
        // The limit a side advertises binds the streams the *other* side
        // opens; h1 allows a single request in flight.
        let limit = if self.mode == Mode::Http2 {
            if local {
                self.remote_settings.max_concurrent_streams()
            } else {
                self.local_settings.max_concurrent_streams()
            }
        } else {
            1
        };
        if self.streams.count(local) as u64 >= u64::from(limit) {
            return Err(if local {
                Error::WouldBlock("wait for on_stream_end")
            } else {
                Error::Protocol("peer exceeded stream limit")
            });
        }
        self.streams.insert(id, local);
        trace!(
            "stream {} opened ({})",
            id,
            if local { "local" } else { "remote" }
        );
        if let Err(err) = self.events.on_stream_start(id) {
            self.streams.remove(id, local);
            return Err(err);
        }
        Ok(())
    }

    fn stream_end(&mut self, id: StreamId) -> Result<()> {
        let local = self.stream_is_local(id);
        if self.streams.remove(id, local).is_some() {
            trace!("stream {} closed", id);
            self.events.on_stream_end(id)?;
        }
        Ok(())
    }

    /// Ends a stream we are resetting (or abandoning) ourselves. Frames the
    /// peer sent before seeing our RST_STREAM must be tolerated, so the id
    /// goes into the reset history first.
    fn stream_end_by_local(&mut self, id: StreamId) -> Result<()> {
        if let Some(stream) = self.streams.find(id) {
            if stream.r_state != HalfState::Closed {
                let expecting = stream.r_state == HalfState::Headers;
                self.streams.record_reset(id, expecting);
            }
        }
        self.stream_end(id)
    }

    // ---- outgoing frames ----

    /// Writes one frame, splitting DATA/HEADERS/PUSH_PROMISE bodies larger
    /// than the peer's max frame size. END_HEADERS belongs on the last frame
    /// of a split header block, END_STREAM on the last DATA frame.
    fn frame_write(&mut self, frame: Frame) -> Result<()> {
        let limit = self.remote_settings.max_frame_size() as usize;
        if frame.payload.len() <= limit {
            trace!(">> frame type {} stream {} len {}", frame.typ, frame.stream, frame.payload.len());
            let header = frame.header_bytes();
            return self.events.on_writev(&[&header[..], &frame.payload[..]]);
        }

        if !matches!(
            frame.kind(),
            Some(FrameType::Data | FrameType::Headers | FrameType::PushPromise)
        ) {
            // The lowest negotiable limit is 16 KiB; a control frame that big
            // is a bug on our side.
            return Err(Error::Assertion("control frame too big"));
        }
        if frame.flags.contains(FrameFlags::PADDED) {
            return Err(Error::NotImplemented("splitting padded frames"));
        }

        let carry = frame.flags
            & if frame.is(FrameType::Data) {
                FrameFlags::END_STREAM
            } else {
                FrameFlags::END_HEADERS
            };
        let mut typ = frame.typ;
        let mut flags = frame.flags - carry;
        let mut offset = 0;
        while frame.payload.len() - offset > limit {
            let part = Frame {
                typ,
                flags,
                stream: frame.stream,
                payload: frame.payload.slice(offset..offset + limit),
            };
            let header = part.header_bytes();
            self.events.on_writev(&[&header[..], &part.payload[..]])?;
            offset += limit;
            if typ != FrameType::Data as u8 {
                typ = FrameType::Continuation as u8;
            }
            flags -= FrameFlags::PRIORITY | FrameFlags::END_STREAM;
        }
        let last = Frame {
            typ,
            flags: flags | carry,
            stream: frame.stream,
            payload: frame.payload.slice(offset..),
        };
        let header = last.header_bytes();
        self.events.on_writev(&[&header[..], &last.payload[..]])
    }

    fn goaway(&mut self, code: ErrorType) -> Result<()> {
        let last = *self.goaway_sent.get_or_insert(self.streams.last_id(false));
        debug!("sending GOAWAY({:?}), last stream {}", code, last);
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&last.to_be_bytes());
        payload.extend_from_slice(&(code as u32).to_be_bytes());
        self.frame_write(Frame::new(FrameType::GoAway, FrameFlags::empty(), 0, payload))
    }

    /// Shuts the connection down over a peer violation: GOAWAY first, then
    /// the error for the caller.
    fn fail<T>(&mut self, code: ErrorType, reason: &'static str) -> Result<T> {
        self.goaway(code)?;
        Err(Error::Protocol(reason))
    }

    fn write_rst_frame(&mut self, id: StreamId, code: ErrorType) -> Result<()> {
        debug!("resetting stream {}: {:?}", id, code);
        let payload = (code as u32).to_be_bytes().to_vec();
        self.frame_write(Frame::new(FrameType::ResetStream, FrameFlags::empty(), id, payload))
    }

    /// Resets a live stream and forgets it, keeping the reset history so the
    /// peer's in-flight frames stay tolerable.
    fn rst_stream(&mut self, id: StreamId, code: ErrorType) -> Result<()> {
        self.write_rst_frame(id, code)?;
        self.stream_end_by_local(id)
    }

    // ---- h2 input states ----

    fn upgrade_to_h2(&mut self) -> Result<()> {
        self.mode = Mode::Http2;
        if self.client {
            self.events.on_writev(&[PREFACE])?;
        }
        let payload = self.local_settings.delta_from(&Settings::standard());
        self.frame_write(Frame::new(FrameType::Settings, FrameFlags::empty(), 0, payload))
    }

    fn when_h2_init(&mut self) -> Result<Control> {
        self.upgrade_to_h2()?;
        Ok(Control::Next(State::H2Preface))
    }

    fn when_h2_preface(&mut self) -> Result<Control> {
        if !self.client {
            let have = self.buffer.len().min(PREFACE.len());
            if self.buffer[..have] != PREFACE[..have] {
                return Err(Error::Protocol("invalid HTTP/2 client preface"));
            }
            if self.buffer.len() < PREFACE.len() {
                return Ok(Control::NeedMore);
            }
            self.buffer.advance(PREFACE.len());
        }
        Ok(Control::Next(State::H2Settings))
    }

    fn when_h2_settings(&mut self) -> Result<Control> {
        // Peek far enough to know the first frame is an unadorned SETTINGS;
        // the frame state does the actual parsing.
        if self.buffer.len() < 5 {
            return Ok(Control::NeedMore);
        }
        if self.buffer[3] != FrameType::Settings as u8 || self.buffer[4] != 0 {
            return Err(Error::Protocol("invalid HTTP/2 preface: no initial SETTINGS"));
        }
        let length = u32::from_be_bytes([0, self.buffer[0], self.buffer[1], self.buffer[2]]);
        if length > self.local_settings.max_frame_size() {
            return Err(Error::Protocol("invalid HTTP/2 preface: initial SETTINGS too big"));
        }
        // Until now the peer was assumed conservative; the frame about to be
        // applied states every deviation it cares about.
        self.remote_settings = Settings::initial();
        Ok(Control::Next(State::H2Frame))
    }

    fn when_h2_frame(&mut self) -> Result<Control> {
        let Some(head) = FrameHeader::parse(&self.buffer) else {
            return Ok(Control::NeedMore);
        };
        if head.length > self.local_settings.max_frame_size() {
            return self.fail(ErrorType::FrameSizeError, "frame too big");
        }
        let mut total = head.total_len();
        if self.buffer.len() < total {
            return Ok(Control::NeedMore);
        }

        // A HEADERS/PUSH_PROMISE without END_HEADERS owns the connection
        // until its CONTINUATIONs arrive. Collect the whole run up front and
        // hand the dispatcher one synthetic frame, so header blocks are
        // always decoded whole.
        let mut flags = head.flags;
        let mut continuations: Vec<(usize, usize)> = Vec::new();
        if (head.typ == FrameType::Headers as u8 || head.typ == FrameType::PushPromise as u8)
            && !head.flags.contains(FrameFlags::END_HEADERS)
        {
            loop {
                let Some(next) = FrameHeader::parse(&self.buffer[total..]) else {
                    return Ok(Control::NeedMore);
                };
                if next.typ != FrameType::Continuation as u8 || next.stream != head.stream {
                    return self.fail(ErrorType::ProtocolError, "expected a CONTINUATION");
                }
                if continuations.len() >= MAX_CONTINUATIONS {
                    return self.fail(ErrorType::EnhanceYourCalm, "too many CONTINUATIONs");
                }
                if next.length > self.local_settings.max_frame_size() {
                    return self.fail(ErrorType::FrameSizeError, "frame too big");
                }
                let begin = total + FRAME_HEADER_LEN;
                let end = begin + next.length as usize;
                if self.buffer.len() < end {
                    return Ok(Control::NeedMore);
                }
                continuations.push((begin, end));
                total = end;
                if next.flags.contains(FrameFlags::END_HEADERS) {
                    flags |= FrameFlags::END_HEADERS;
                    break;
                }
            }
        }

        let raw = self.buffer.split_to(total).freeze();
        let payload = if continuations.is_empty() {
            raw.slice(FRAME_HEADER_LEN..head.total_len())
        } else {
            let mut assembled = BytesMut::with_capacity(total - FRAME_HEADER_LEN);
            assembled.extend_from_slice(&raw[FRAME_HEADER_LEN..head.total_len()]);
            for &(begin, end) in &continuations {
                assembled.extend_from_slice(&raw[begin..end]);
            }
            assembled.freeze()
        };
        let frame = Frame {
            typ: head.typ,
            flags,
            stream: head.stream,
            payload,
        };
        trace!("<< frame type {} stream {} len {}", frame.typ, frame.stream, frame.payload.len());
        self.events.on_frame(&frame)?;
        self.dispatch(frame)?;
        Ok(Control::Next(State::H2Frame))
    }

    // ---- h2 frame dispatch ----

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        match FrameType::from_u8(frame.typ) {
            Some(FrameType::Data) => self.handle_data(frame),
            Some(FrameType::Headers) => self.handle_headers(frame),
            Some(FrameType::Priority) => self.handle_priority_frame(frame),
            Some(FrameType::ResetStream) => self.handle_rst_stream(frame),
            Some(FrameType::Settings) => self.handle_settings(frame),
            Some(FrameType::PushPromise) => self.handle_push_promise(frame),
            Some(FrameType::Ping) => self.handle_ping(frame),
            Some(FrameType::GoAway) => self.handle_goaway(&frame),
            Some(FrameType::WindowUpdate) => self.handle_window_update(frame),
            // Coalescence in the input state means no CONTINUATION can
            // legitimately get this far.
            Some(FrameType::Continuation) => {
                self.fail(ErrorType::ProtocolError, "unexpected CONTINUATION")
            }
            // >Implementations MUST ignore and discard any frame that has
            // >a type that is unknown.
            None => Ok(()),
        }
    }

    /// Late frames on streams we no longer know: tolerated if the stream was
    /// recently reset locally, a protocol error otherwise.
    fn handle_invalid_stream(&mut self, frame: &Frame) -> Result<()> {
        if frame.stream != 0
            && frame.stream <= self.streams.last_id(self.stream_is_local(frame.stream))
            && self.streams.tolerates(frame.stream, frame.typ)
        {
            return Ok(());
        }
        self.fail(ErrorType::ProtocolError, "invalid stream")
    }

    /// Narrows the payload past the pad-length octet and the padding.
    fn strip_padding(&mut self, frame: &mut Frame) -> Result<()> {
        if frame.flags.contains(FrameFlags::PADDED) {
            if frame.payload.is_empty() {
                return self.fail(ErrorType::FrameSizeError, "no padding found");
            }
            let padding = frame.payload[0] as usize + 1;
            if padding > frame.payload.len() {
                return self.fail(ErrorType::ProtocolError, "more padding than data");
            }
            let end = frame.payload.len() - (padding - 1);
            frame.payload = frame.payload.slice(1..end);
        }
        Ok(())
    }

    /// Strips the 5-octet priority block (prioritization itself is not
    /// supported). `Ok(true)` means the frame was fully disposed of here
    /// because it named itself as its own dependency.
    fn strip_priority(&mut self, frame: &mut Frame) -> Result<bool> {
        if frame.flags.contains(FrameFlags::PRIORITY) || frame.is(FrameType::Priority) {
            if frame.payload.len() < 5
                || (frame.is(FrameType::Priority) && frame.payload.len() != 5)
            {
                return self.fail(ErrorType::FrameSizeError, "PRIORITY of invalid size");
            }
            if frame.stream == 0 {
                return self.fail(ErrorType::ProtocolError, "PRIORITY on stream 0");
            }
            let dependency = u32::from_be_bytes([
                frame.payload[0],
                frame.payload[1],
                frame.payload[2],
                frame.payload[3],
            ]) & 0x7FFF_FFFF;
            if dependency == frame.stream {
                if self.streams.find(frame.stream).is_some() {
                    self.rst_stream(frame.stream, ErrorType::ProtocolError)?;
                    return Ok(true);
                }
                return self.fail(ErrorType::ProtocolError, "PRIORITY depends on itself");
            }
            frame.payload = frame.payload.slice(5..);
        }
        Ok(false)
    }

    fn handle_priority_frame(&mut self, mut frame: Frame) -> Result<()> {
        self.strip_priority(&mut frame).map(|_| ())
    }

    fn handle_data(&mut self, mut frame: Frame) -> Result<()> {
        // For flow control purposes padding counts, and even frames on dead
        // streams consume the connection-level window, which is returned
        // unconditionally.
        let full_length = frame.payload.len() as u32;
        self.strip_padding(&mut frame)?;
        if full_length > 0 {
            self.window_recv -= i64::from(full_length);
            let payload = full_length.to_be_bytes().to_vec();
            self.frame_write(Frame::new(FrameType::WindowUpdate, FrameFlags::empty(), 0, payload))?;
            self.window_recv += i64::from(full_length);
        }

        let id = frame.stream;
        let Some(r_state) = self.streams.find(id).map(|s| s.r_state) else {
            return self.handle_invalid_stream(&frame);
        };
        if r_state != HalfState::Data {
            return self.rst_stream(id, ErrorType::StreamClosed);
        }
        let window = self
            .streams
            .find(id)
            .map_or(0, |s| s.window_recv)
            + i64::from(self.local_settings.initial_window_size());
        if full_length > 0 && i64::from(full_length) > window {
            return self.rst_stream(id, ErrorType::FlowControlError);
        }

        let data_length = frame.payload.len() as u64;
        if let Some(stream) = self.streams.find_mut(id) {
            if let Some(remaining) = stream.remaining_payload.as_mut() {
                // Over-delivery wraps and is caught at end of stream.
                *remaining = remaining.wrapping_sub(data_length);
            }
        }
        if !frame.payload.is_empty() {
            self.events.on_message_data(id, &frame.payload)?;
        }
        if frame.flags.contains(FrameFlags::END_STREAM) {
            return self.handle_end_stream(id, None);
        }

        let mut refill = full_length;
        if self.manual_flow_control {
            // Only the padding refills by itself; the application returns
            // payload credit through open_flow.
            if let Some(stream) = self.streams.find_mut(id) {
                stream.window_recv -= data_length as i64;
            }
            refill = full_length - data_length as u32;
        }
        if refill == 0 {
            return Ok(());
        }
        let payload = refill.to_be_bytes().to_vec();
        self.frame_write(Frame::new(FrameType::WindowUpdate, FrameFlags::empty(), id, payload))
    }

    /// Closes the read half once a message is complete, checking the declared
    /// content length was honored first.
    fn handle_end_stream(&mut self, id: StreamId, trailers: Option<&Message>) -> Result<()> {
        let Some((head_response, mismatch)) = self
            .streams
            .find(id)
            .map(|s| (s.reading_head_response, matches!(s.remaining_payload, Some(n) if n != 0)))
        else {
            return Ok(());
        };
        if !head_response && mismatch {
            return self.rst_stream(id, ErrorType::ProtocolError);
        }
        self.events.on_message_tail(id, trailers)?;
        let both_closed = match self.streams.find_mut(id) {
            Some(stream) => {
                stream.r_state = HalfState::Closed;
                stream.w_state == HalfState::Closed
            }
            None => false,
        };
        if both_closed {
            return self.stream_end(id);
        }
        Ok(())
    }

    fn decode_header_block(&mut self, block: &[u8]) -> Result<Vec<Header>> {
        match self.decoder.decode(block) {
            Ok(headers) => Ok(headers),
            Err(_) => {
                // The shared compression context is unrecoverable.
                self.goaway(ErrorType::CompressionError)?;
                Err(Error::Protocol("header block does not decode"))
            }
        }
    }

    fn handle_headers(&mut self, mut frame: Frame) -> Result<()> {
        self.strip_padding(&mut frame)?;
        if self.strip_priority(&mut frame)? {
            return Ok(());
        }

        let id = frame.stream;
        let end_stream = frame.flags.contains(FrameFlags::END_STREAM);
        let deliver = match self.streams.find(id).map(|s| s.r_state) {
            None => {
                if self.client || id <= self.streams.last_id(false) {
                    // A late frame on a reset stream. Its block still has to
                    // go through the decoder below to keep the dynamic table
                    // in sync, but nobody gets to see the result.
                    self.handle_invalid_stream(&frame)?;
                    false
                } else if self.goaway_sent.is_some()
                    || self.streams.count(false) as u64
                        >= u64::from(self.local_settings.max_concurrent_streams())
                {
                    self.write_rst_frame(id, ErrorType::RefusedStream)?;
                    false
                } else {
                    self.stream_new(id, false)?;
                    true
                }
            }
            Some(HalfState::Data) => {
                // >An endpoint that receives a HEADERS frame without the
                // >END_STREAM flag set after receiving a final [...] response
                // >MUST treat the corresponding request or response as
                // >malformed.
                if !end_stream {
                    return self.fail(ErrorType::ProtocolError, "trailers without END_STREAM");
                }
                true
            }
            Some(HalfState::Headers) => true,
            Some(HalfState::Closed) => {
                return self.fail(ErrorType::ProtocolError, "unexpected HEADERS")
            }
        };

        let headers = self.decode_header_block(&frame.payload)?;
        if !deliver {
            return Ok(());
        }
        self.handle_message(id, headers, end_stream, None)
    }

    fn handle_push_promise(&mut self, mut frame: Frame) -> Result<()> {
        self.strip_padding(&mut frame)?;
        if frame.payload.len() < 4 {
            return self.fail(ErrorType::FrameSizeError, "PUSH_PROMISE too short");
        }
        let parent = frame.stream;
        let parent_readable = self
            .streams
            .find(parent)
            .map_or(false, |s| s.r_state != HalfState::Closed);
        if self.local_settings.enable_push() == 0
            || !self.stream_is_local(parent)
            || !parent_readable
        {
            return self.fail(ErrorType::ProtocolError, "unexpected PUSH_PROMISE");
        }

        let promised = u32::from_be_bytes([
            frame.payload[0],
            frame.payload[1],
            frame.payload[2],
            frame.payload[3],
        ]) & 0x7FFF_FFFF;
        frame.payload = frame.payload.slice(4..);
        self.stream_new(promised, false)?;
        let headers = self.decode_header_block(&frame.payload)?;
        self.handle_message(promised, headers, false, Some(parent))
    }

    /// Validates a decoded header list and turns it into a message, trailers,
    /// or a push, enforcing the pseudo-header grammar. Violations reset the
    /// carrying stream, never the connection.
    fn handle_message(
        &mut self,
        id: StreamId,
        mut headers: Vec<Header>,
        end_stream: bool,
        push_parent: Option<StreamId>,
    ) -> Result<()> {
        let is_response = self.client && push_parent.is_none();
        let Some(r_state) = self.streams.find(id).map(|s| s.r_state) else {
            return Ok(());
        };

        // >All pseudo-header fields MUST appear in the header block before
        // >regular header fields. (A pseudo-header after a regular one also
        // >trips the name check below, since `:` is not a tchar.)
        let pseudo_len = headers
            .iter()
            .take_while(|h| h.name.as_ref().starts_with(b":"))
            .count();
        // >Pseudo-header fields MUST NOT appear in trailers.
        if pseudo_len > 0 && r_state != HalfState::Headers {
            return self.rst_stream(id, ErrorType::ProtocolError);
        }

        let regular = headers.split_off(pseudo_len);
        let mut code: u64 = 0;
        let mut method: Option<Bytes> = None;
        let mut path: Option<Bytes> = None;
        let mut has_scheme = false;
        let mut has_authority = false;
        let mut kept: Vec<Header> = Vec::with_capacity(regular.len() + 2);
        for header in headers {
            let name: &[u8] = &header.name;
            if is_response {
                if name == b":status" {
                    let parsed = message::parse_uint(&header.value);
                    match parsed {
                        Some(value) if code == 0 && value <= 0xFFFF => code = value,
                        _ => return self.rst_stream(id, ErrorType::ProtocolError),
                    }
                    continue;
                }
            } else {
                match name {
                    b":path" => {
                        if path.is_some() {
                            return self.rst_stream(id, ErrorType::ProtocolError);
                        }
                        path = Some(header.value);
                        continue;
                    }
                    b":method" => {
                        if method.is_some() {
                            return self.rst_stream(id, ErrorType::ProtocolError);
                        }
                        method = Some(header.value);
                        continue;
                    }
                    b":authority" => {
                        if has_authority {
                            return self.rst_stream(id, ErrorType::ProtocolError);
                        }
                        has_authority = true;
                        kept.push(header);
                        continue;
                    }
                    b":scheme" => {
                        if has_scheme {
                            return self.rst_stream(id, ErrorType::ProtocolError);
                        }
                        has_scheme = true;
                        kept.push(header);
                        continue;
                    }
                    _ => {}
                }
            }
            // >Endpoints MUST NOT generate pseudo-header fields other than
            // >those defined in this document.
            return self.rst_stream(id, ErrorType::ProtocolError);
        }

        let mut remaining_payload = None;
        for header in &regular {
            let name: &[u8] = &header.name;
            if !message::valid_header_name(name) {
                return self.rst_stream(id, ErrorType::ProtocolError);
            }
            // >HTTP/2 does not use the Connection header field.
            if name == b"connection" {
                return self.rst_stream(id, ErrorType::ProtocolError);
            }
            // >The only exception to this is the TE header field, which MAY
            // >be present [but] MUST NOT contain any value other than
            // >"trailers".
            if name == b"te" && header.value != "trailers" {
                return self.rst_stream(id, ErrorType::ProtocolError);
            }
            if name == b"content-length" {
                match message::parse_uint(&header.value) {
                    Some(length) => remaining_payload = Some(length),
                    None => return self.rst_stream(id, ErrorType::ProtocolError),
                }
            }
        }
        kept.extend(regular);

        if let Some(stream) = self.streams.find_mut(id) {
            stream.remaining_payload = remaining_payload;
        }

        let msg = Message {
            code: code as u32,
            method: method.clone().unwrap_or_default(),
            path: path.clone().unwrap_or_default(),
            headers: kept,
        };

        if r_state != HalfState::Headers {
            // Trailers; the frame handler already required END_STREAM.
            return self.handle_end_stream(id, Some(&msg));
        }

        // >All HTTP/2 requests MUST include exactly one valid value for the
        // >:method, :scheme, and :path pseudo-header fields, unless it is a
        // >CONNECT request.
        let well_formed = if is_response {
            msg.code != 0
        } else {
            msg.method == "CONNECT"
                || (!msg.path.is_empty() && !msg.method.is_empty() && has_scheme)
        };
        if !well_formed {
            return self.rst_stream(id, ErrorType::ProtocolError);
        }

        if let Some(parent) = push_parent {
            return self.events.on_message_push(parent, &msg, id);
        }

        if msg.is_informational() {
            // A 1xx is not final: the read half keeps waiting for the real
            // head, so it can neither end the stream nor declare a body.
            if remaining_payload.is_some() || end_stream {
                return self.rst_stream(id, ErrorType::ProtocolError);
            }
        } else if let Some(stream) = self.streams.find_mut(id) {
            stream.r_state = HalfState::Data;
        }

        self.events.on_message_head(id, &msg)?;
        if end_stream {
            return self.handle_end_stream(id, None);
        }
        Ok(())
    }

    fn handle_rst_stream(&mut self, frame: Frame) -> Result<()> {
        if self.streams.find(frame.stream).is_none() {
            return self.handle_invalid_stream(&frame);
        }
        if frame.payload.len() != 4 {
            return self.fail(ErrorType::FrameSizeError, "bad RST_STREAM");
        }
        let code = u32::from_be_bytes([
            frame.payload[0],
            frame.payload[1],
            frame.payload[2],
            frame.payload[3],
        ]);
        debug!(
            "stream {} reset by peer: {:?}",
            frame.stream,
            ErrorType::from_u32(code)
        );
        self.stream_end(frame.stream)
    }

    fn handle_settings(&mut self, frame: Frame) -> Result<()> {
        if frame.stream != 0 {
            return self.fail(ErrorType::ProtocolError, "SETTINGS on a stream");
        }
        if frame.flags.contains(FrameFlags::ACK) {
            if !frame.payload.is_empty() {
                return self.fail(ErrorType::FrameSizeError, "bad SETTINGS ack");
            }
            return Ok(());
        }
        if frame.payload.len() % 6 != 0 {
            return self.fail(ErrorType::FrameSizeError, "bad SETTINGS");
        }

        let old_window = self.remote_settings.initial_window_size();
        self.remote_settings.apply_payload(&frame.payload);
        if let Err((code, reason)) = self.remote_settings.check() {
            return self.fail(code, reason);
        }

        if self.remote_settings.initial_window_size() > old_window {
            // Every stream's effective send window just grew.
            self.events.on_flow_increase(0)?;
        }
        let limit = self
            .remote_settings
            .header_table_size()
            .min(self.local_settings.header_table_size());
        self.encoder.set_limit(limit as usize);
        self.frame_write(Frame::new(FrameType::Settings, FrameFlags::ACK, 0, Bytes::new()))?;
        self.events.on_settings()
    }

    fn handle_ping(&mut self, frame: Frame) -> Result<()> {
        if frame.stream != 0 {
            return self.fail(ErrorType::ProtocolError, "PING on a stream");
        }
        if frame.payload.len() != 8 {
            return self.fail(ErrorType::FrameSizeError, "bad PING frame");
        }
        if frame.flags.contains(FrameFlags::ACK) {
            let mut payload = [0u8; 8];
            payload.copy_from_slice(&frame.payload);
            return self.events.on_pong(payload);
        }
        self.frame_write(Frame::new(FrameType::Ping, FrameFlags::ACK, 0, frame.payload))
    }

    fn handle_goaway(&mut self, frame: &Frame) -> Result<()> {
        if frame.stream != 0 {
            return self.fail(ErrorType::ProtocolError, "GOAWAY on a stream");
        }
        if frame.payload.len() < 8 {
            return self.fail(ErrorType::FrameSizeError, "bad GOAWAY");
        }
        let code = u32::from_be_bytes([
            frame.payload[4],
            frame.payload[5],
            frame.payload[6],
            frame.payload[7],
        ]);
        if code != ErrorType::NoError as u32 {
            warn!("peer sent GOAWAY with error {}", code);
            return Err(Error::PeerError(
                ErrorType::from_u32(code).unwrap_or(ErrorType::ProtocolError),
            ));
        }
        Err(Error::Disconnect)
    }

    fn handle_window_update(&mut self, frame: Frame) -> Result<()> {
        if frame.payload.len() != 4 {
            return self.fail(ErrorType::FrameSizeError, "bad WINDOW_UPDATE");
        }
        let increment = u32::from_be_bytes([
            frame.payload[0],
            frame.payload[1],
            frame.payload[2],
            frame.payload[3],
        ]);
        if increment == 0 || i64::from(increment) > MAX_WINDOW {
            return self.fail(ErrorType::ProtocolError, "window increment out of bounds");
        }
        if frame.stream == 0 {
            self.window_send += i64::from(increment);
            if self.window_send > MAX_WINDOW {
                return self.fail(ErrorType::FlowControlError, "window increment too big");
            }
        } else {
            let updated = match self.streams.find_mut(frame.stream) {
                Some(stream) => {
                    stream.window_send += i64::from(increment);
                    Some(stream.window_send)
                }
                None => None,
            };
            match updated {
                None => return self.handle_invalid_stream(&frame),
                Some(window_send) => {
                    if window_send + i64::from(self.remote_settings.initial_window_size())
                        > MAX_WINDOW
                    {
                        return self.rst_stream(frame.stream, ErrorType::FlowControlError);
                    }
                }
            }
        }
        self.events.on_flow_increase(frame.stream)
    }

    // ---- h1 input states ----

    fn when_h1_head(&mut self) -> Result<Control> {
        if self.buffer.is_empty() {
            return Ok(Control::NeedMore);
        }

        let current = self.h1_stream_id();
        let id;
        if self.client {
            match self.streams.find(current).map(|s| s.r_state) {
                Some(HalfState::Headers) => id = current,
                _ => return Err(Error::Protocol("HTTP/1.x response without a request")),
            }
        } else {
            match self.streams.find(current).map(|s| s.r_state) {
                None => {
                    // A preface instead of a request line means the client
                    // speaks h2 with prior knowledge; only possible before
                    // any h1 request came through.
                    if !self.disallow_h2_prior_knowledge && self.streams.last_id(false) == 0 {
                        let have = self.buffer.len().min(PREFACE.len());
                        if self.buffer[..have] == PREFACE[..have] {
                            return Ok(if self.buffer.len() < PREFACE.len() {
                                Control::NeedMore
                            } else {
                                Control::Next(State::H2Init)
                            });
                        }
                    }
                    id = (self.streams.last_id(false) + 1) | 1;
                    self.stream_new(id, false)?;
                }
                Some(HalfState::Headers) => id = current,
                Some(_) => return Err(Error::WouldBlock("already reading an HTTP/1.x message")),
            }
        }

        let parsed = if self.client {
            h1::parse_response(&self.buffer)?
        } else {
            h1::parse_request(&self.buffer)?
        };
        let Some(raw) = parsed else {
            let cap = u64::from(MAX_CONTINUATIONS as u32 + 1)
                * u64::from(self.local_settings.max_frame_size());
            if self.buffer.len() as u64 > cap {
                return Err(Error::Protocol("HTTP/1.x message too big"));
            }
            return Ok(Control::NeedMore);
        };
        if raw.minor > 1 {
            return Err(Error::Protocol("unsupported HTTP/1.x minor version"));
        }

        let mut msg = Message {
            code: raw.code,
            method: raw.method,
            path: raw.path,
            headers: Vec::with_capacity(raw.headers.len() + 2),
        };
        let mut body = BodyLength::Sized(0);
        let mut upgrade = false;
        if !self.client {
            // h1 requests name the target differently; fill in what h2
            // callers expect and let Host override below.
            msg.headers.push(Header::new(":scheme", "unknown"));
            msg.headers.push(Header::new(":authority", "unknown"));
        }

        for (name, value) in raw.headers {
            let Some(folded) = message::normalize_header_name(&name) else {
                return Err(Error::Protocol("invalid character in h1 header"));
            };
            let name = Bytes::from(folded);
            if !self.client && name == "host" {
                msg.headers[1].value = value;
                continue;
            } else if name == "http2-settings" {
                // Carried by upgrade requests; the handshake below works
                // without decoding it.
                continue;
            } else if name == "upgrade" {
                if self.mode != Mode::Http1 {
                    // Mid h2c handshake; the application hears nothing.
                    continue;
                } else if value == "h2c" {
                    if self.client || id != 1 || upgrade || self.disallow_h2_upgrade {
                        continue;
                    }
                    self.events.on_writev(&[UPGRADE_RESPONSE])?;
                    self.upgrade_to_h2()?;
                    continue;
                } else if !self.client {
                    upgrade = true;
                }
            } else if name == "content-length" {
                if body == BodyLength::Chunked {
                    // Chunked framing wins; the redundant length is dropped.
                    continue;
                }
                if body != BodyLength::Sized(0) {
                    return Err(Error::Protocol("multiple content-lengths"));
                }
                body = BodyLength::Sized(
                    message::parse_uint(&value).ok_or(Error::Protocol("invalid content-length"))?,
                );
            } else if name == "transfer-encoding" {
                if value == "identity" {
                    continue;
                }
                // Any other transfer-encoding implies chunked framing on the
                // wire; the chunked token itself disappears from the list.
                body = BodyLength::Chunked;
                let keep = h1::strip_chunked_token(&value);
                if keep == 0 {
                    continue;
                }
                msg.headers.push(Header { name, value: value.slice(..keep) });
                continue;
            }
            msg.headers.push(Header { name, value });
        }

        if msg.code == 101 {
            // The rest of the connection belongs to whatever protocol was
            // switched to; it is forwarded as this message's body.
            body = BodyLength::Tunnel;
        } else if msg.is_informational() && body != BodyLength::Sized(0) {
            return Err(Error::Protocol("informational response with a payload"));
        }
        if self
            .streams
            .find(id)
            .map_or(false, |s| s.reading_head_response)
        {
            // HEAD responses declare a body that never arrives.
            body = BodyLength::Sized(0);
        }

        self.events.on_message_head(id, &msg)?;
        if upgrade {
            self.events.on_upgrade()?;
        }
        self.buffer.advance(raw.consumed);

        if msg.is_informational() && msg.code != 101 {
            return Ok(Control::Next(State::H1Head));
        }
        if let Some(stream) = self.streams.find_mut(id) {
            stream.r_state = HalfState::Data;
        }
        self.body_remaining = body;
        Ok(Control::Next(match body {
            BodyLength::Chunked => State::H1Chunk,
            BodyLength::Sized(0) => State::H1Tail,
            BodyLength::Sized(_) | BodyLength::Tunnel => State::H1Body,
        }))
    }

    fn when_h1_body(&mut self) -> Result<Control> {
        loop {
            let take = match self.body_remaining {
                BodyLength::Sized(0) | BodyLength::Chunked => break,
                BodyLength::Sized(remaining) => (self.buffer.len() as u64).min(remaining),
                BodyLength::Tunnel => self.buffer.len() as u64,
            };
            if take == 0 {
                return Ok(Control::NeedMore);
            }
            let chunk = self.buffer.split_to(take as usize).freeze();
            if let BodyLength::Sized(remaining) = &mut self.body_remaining {
                *remaining -= take;
            }
            let id = self.h1_stream_id();
            if self.streams.find(id).is_some() {
                self.events.on_message_data(id, &chunk)?;
            }
        }
        Ok(Control::Next(if self.state == State::H1Body {
            State::H1Tail
        } else {
            State::H1ChunkTail
        }))
    }

    fn when_h1_tail(&mut self) -> Result<Control> {
        let id = self.h1_stream_id();
        if self.streams.find(id).is_some() {
            self.events.on_message_tail(id, None)?;
            let both_closed = match self.streams.find_mut(id) {
                Some(stream) => {
                    stream.r_state = HalfState::Closed;
                    stream.w_state == HalfState::Closed
                }
                None => false,
            };
            if both_closed {
                self.stream_end(id)?;
            }
        }
        Ok(Control::Next(if self.mode == Mode::Http2 {
            // The h2c handshake continues where the upgrade request ended.
            State::H2Preface
        } else {
            State::H1Head
        }))
    }

    fn when_h1_chunk(&mut self) -> Result<Control> {
        match h1::parse_chunk_size(&self.buffer)? {
            h1::ChunkSize::Incomplete => {
                if self.buffer.len() as u64 >= u64::from(self.local_settings.max_frame_size()) {
                    return Err(Error::Protocol("too many h1 chunk extensions"));
                }
                Ok(Control::NeedMore)
            }
            h1::ChunkSize::Line { consumed, size } => {
                self.buffer.advance(consumed);
                self.body_remaining = BodyLength::Sized(size);
                Ok(Control::Next(if size == 0 {
                    State::H1Trailers
                } else {
                    State::H1ChunkBody
                }))
            }
        }
    }

    fn when_h1_chunk_tail(&mut self) -> Result<Control> {
        if self.buffer.len() < 2 {
            return Ok(Control::NeedMore);
        }
        if &self.buffer[..2] != b"\r\n" {
            return Err(Error::Protocol("invalid h1 chunk terminator"));
        }
        self.buffer.advance(2);
        Ok(Control::Next(State::H1Chunk))
    }

    fn when_h1_trailers(&mut self) -> Result<Control> {
        // TODO: surface h1 trailers through on_message_tail instead of
        // requiring the terminating CRLF immediately.
        match self.when_h1_chunk_tail()? {
            Control::NeedMore => Ok(Control::NeedMore),
            Control::Next(_) => Ok(Control::Next(State::H1Tail)),
        }
    }

    // ---- writer API ----

    /// Sends a request or response head on `sid`. With `final_` the message
    /// has no body and the write half closes. Clients may name a fresh
    /// stream id (see [`next_stream_id`](Connection::next_stream_id)); it is
    /// opened on the spot.
    pub fn write_head(&mut self, sid: StreamId, msg: &Message, final_: bool) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::Disconnect);
        }
        if self.client && msg.code != 0 {
            return Err(Error::Assertion("clients send requests, not responses"));
        }
        if !self.client && !msg.path.is_empty() {
            return Err(Error::Assertion("servers send responses, not requests"));
        }
        let informational = msg.is_informational();
        if informational && final_ {
            return Err(Error::Assertion("1xx codes cannot end the stream"));
        }
        for header in &msg.headers {
            if header.name.iter().any(u8::is_ascii_uppercase) {
                return Err(Error::Assertion("header names should be lowercase"));
            }
        }

        if self.client && self.streams.find(sid).is_none() {
            self.stream_new(sid, true)?;
        }
        let writable = self
            .streams
            .find(sid)
            .map_or(false, |s| s.w_state == HalfState::Headers);
        if !writable {
            return Err(Error::InvalidStream("this stream is not writable"));
        }
        let head_request = msg.method == "HEAD";
        if let Some(stream) = self.streams.find_mut(sid) {
            stream.reading_head_response = head_request;
        }

        let informational = if self.mode == Mode::Http1 {
            self.write_h1_head(sid, msg, final_, informational)?
        } else {
            self.write_h2_head(sid, msg, final_)?;
            informational
        };

        if final_ {
            return self.close_write_half(sid);
        }
        if !informational {
            if let Some(stream) = self.streams.find_mut(sid) {
                stream.w_state = HalfState::Data;
            }
        }
        Ok(())
    }

    /// h1 head serialization. Returns whether the message still counts as
    /// informational (a 101 that switches to tunneling does not).
    fn write_h1_head(
        &mut self,
        sid: StreamId,
        msg: &Message,
        final_: bool,
        informational: bool,
    ) -> Result<bool> {
        let mut head = Vec::with_capacity(256);
        if self.client {
            head.extend_from_slice(&msg.method);
            head.push(b' ');
            head.extend_from_slice(&msg.path);
            head.extend_from_slice(b" HTTP/1.1\r\n");
        } else {
            // The message model carries no reason phrase.
            head.extend_from_slice(format!("HTTP/1.1 {} No Reason\r\n", msg.code).as_bytes());
        }

        let mut chunked = !informational && !final_;
        for header in &msg.headers {
            let mut value: &[u8] = &header.value;
            let name: &[u8] = if header.name == ":authority" {
                b"host"
            } else if header.name.as_ref().starts_with(b":") {
                // :scheme and friends have no h1 spelling.
                continue;
            } else {
                &header.name
            };
            if name == b"content-length" || name == b"upgrade" {
                // The body is delimited some other way.
                chunked = false;
            } else if name == b"transfer-encoding" {
                // Chunked framing is decided here, not by the caller; a
                // leftover token would either duplicate ours or lie.
                let keep = h1::strip_chunked_token(value);
                if keep == 0 {
                    continue;
                }
                value = &value[..keep];
            }
            head.extend_from_slice(name);
            head.extend_from_slice(b": ");
            head.extend_from_slice(value);
            head.extend_from_slice(b"\r\n");
        }
        if chunked {
            head.extend_from_slice(b"transfer-encoding: chunked\r\n\r\n");
        } else {
            head.extend_from_slice(b"\r\n");
        }
        self.events.on_writev(&[&head])?;

        if let Some(stream) = self.streams.find_mut(sid) {
            stream.writing_chunked = chunked;
        }

        let mut informational = informational;
        if msg.code == 101
            && self.state == State::H1Head
            && self
                .streams
                .find(sid)
                .map_or(false, |s| s.r_state != HalfState::Closed)
        {
            // Switching protocols: the peer's bytes now tunnel through as
            // the request body, and no later response will follow.
            self.body_remaining = BodyLength::Tunnel;
            informational = false;
        }
        Ok(informational)
    }

    fn write_h2_head(&mut self, sid: StreamId, msg: &Message, final_: bool) -> Result<()> {
        let mut payload = if self.client {
            let pseudo = [
                Header::new(":method", msg.method.clone()),
                Header::new(":path", msg.path.clone()),
            ];
            self.encoder.encode(&pseudo)
        } else {
            let status = msg.code.to_string();
            self.encoder.encode(&[Header::new(":status", status.into_bytes())])
        };
        payload.extend_from_slice(&self.encoder.encode(&msg.headers));
        let mut flags = FrameFlags::END_HEADERS;
        if final_ {
            flags |= FrameFlags::END_STREAM;
        }
        self.frame_write(Frame::new(FrameType::Headers, flags, sid, payload))
    }

    /// Closes the write half after a final head or data write; the stream
    /// dies once the read half is done too. A server also resets the stream
    /// to tell the peer the rest of the request body is unwanted.
    fn close_write_half(&mut self, sid: StreamId) -> Result<()> {
        let read_closed = match self.streams.find_mut(sid) {
            Some(stream) => {
                stream.w_state = HalfState::Closed;
                stream.r_state == HalfState::Closed
            }
            None => return Ok(()),
        };
        if read_closed {
            return self.stream_end_by_local(sid);
        }
        if !self.client && self.mode == Mode::Http2 {
            self.rst_stream(sid, ErrorType::NoError)?;
        }
        Ok(())
    }

    /// Sends body bytes, returning how many were accepted. h2 writes are
    /// clamped to the stream and connection send windows; when a write comes
    /// back short, wait for `on_flow_increase` and retry the rest (a clamped
    /// write also drops `final_`).
    pub fn write_data(&mut self, sid: StreamId, data: &[u8], mut final_: bool) -> Result<usize> {
        if self.state == State::Closed {
            return Err(Error::Disconnect);
        }
        let writable = self
            .streams
            .find(sid)
            .map_or(false, |s| s.w_state == HalfState::Data);
        if !writable {
            return Err(Error::InvalidStream("this stream is not writable"));
        }

        let accepted;
        if self.mode == Mode::Http1 {
            accepted = data.len();
            let chunked = self.streams.find(sid).map_or(false, |s| s.writing_chunked);
            if chunked {
                let size_line = format!("{:X}\r\n", data.len());
                let mut parts: Vec<&[u8]> = Vec::with_capacity(4);
                if !data.is_empty() {
                    parts.push(size_line.as_bytes());
                    parts.push(data);
                    parts.push(b"\r\n");
                }
                if final_ {
                    parts.push(b"0\r\n\r\n");
                }
                if !parts.is_empty() {
                    self.events.on_writev(&parts)?;
                }
            } else if !data.is_empty() {
                self.events.on_writev(&[data])?;
            }
        } else {
            let stream_window = self.streams.find(sid).map_or(0, |s| s.window_send)
                + i64::from(self.remote_settings.initial_window_size());
            let window = stream_window.min(self.window_send).max(0) as u64;
            let mut length = data.len();
            if length as u64 > window {
                length = window as usize;
                final_ = false;
            }
            if length == 0 && !final_ {
                return Ok(0);
            }
            let flags = if final_ {
                FrameFlags::END_STREAM
            } else {
                FrameFlags::empty()
            };
            self.frame_write(Frame::new(
                FrameType::Data,
                flags,
                sid,
                Bytes::copy_from_slice(&data[..length]),
            ))?;
            self.window_send -= length as i64;
            if let Some(stream) = self.streams.find_mut(sid) {
                stream.window_send -= length as i64;
            }
            accepted = length;
        }

        if final_ {
            self.close_write_half(sid)?;
        }
        Ok(accepted)
    }

    /// Promises a pushed request on a fresh local stream under `parent`.
    /// Quietly does nothing when the peer opted out of push or the parent is
    /// gone; pushes are an optimization, not a contract.
    pub fn write_push(&mut self, parent: StreamId, msg: &Message) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::Disconnect);
        }
        if self.client {
            return Err(Error::Assertion("clients cannot push"));
        }
        if self.mode != Mode::Http2 || self.remote_settings.enable_push() == 0 {
            return Ok(());
        }
        let parent_writable = self
            .streams
            .find(parent)
            .map_or(false, |s| s.w_state != HalfState::Closed);
        if self.stream_is_local(parent) || !parent_writable {
            return Ok(());
        }

        let promised = self.next_stream_id();
        self.stream_new(promised, true)?;
        let mut payload = promised.to_be_bytes().to_vec();
        let pseudo = [
            Header::new(":method", msg.method.clone()),
            Header::new(":path", msg.path.clone()),
        ];
        payload.extend_from_slice(&self.encoder.encode(&pseudo));
        payload.extend_from_slice(&self.encoder.encode(&msg.headers));
        self.frame_write(Frame::new(
            FrameType::PushPromise,
            FrameFlags::END_HEADERS,
            parent,
            payload,
        ))?;
        // Mirror the promise locally so the promised stream sees the same
        // head/tail sequence an inbound request would produce.
        self.events.on_message_head(promised, msg)?;
        self.events.on_message_tail(promised, None)
    }

    /// `sid == 0` sends GOAWAY(code); otherwise the stream is reset and
    /// locally destroyed. In h1 nothing can be said on the wire; close the
    /// transport instead.
    pub fn write_reset(&mut self, sid: StreamId, code: ErrorType) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Ok(());
        }
        if sid == 0 {
            return self.goaway(code);
        }
        if self.streams.find(sid).is_some() {
            self.rst_stream(sid, code)
        } else {
            // Idle or already-reset streams have nothing left to reset.
            Ok(())
        }
    }

    pub fn write_ping(&mut self, payload: [u8; 8]) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Err(Error::Assertion("cannot ping an HTTP/1.x peer"));
        }
        self.frame_write(Frame::new(FrameType::Ping, FrameFlags::empty(), 0, payload.to_vec()))
    }

    /// Escape hatch for frames the writer API does not model. DATA must go
    /// through [`write_data`](Connection::write_data) so flow control stays
    /// accounted.
    pub fn write_frame(&mut self, frame: Frame) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Err(Error::Assertion("cannot send frames to an HTTP/1.x peer"));
        }
        if frame.is(FrameType::Data) {
            return Err(Error::Assertion("DATA goes through write_data"));
        }
        self.frame_write(frame)
    }

    /// Returns receive credit to the peer for `sid` (used with manual flow
    /// control after the application has consumed the data).
    pub fn open_flow(&mut self, sid: StreamId, delta: u32) -> Result<()> {
        if delta == 0 || sid == 0 || self.mode != Mode::Http2 {
            return Ok(());
        }
        match self.streams.find_mut(sid) {
            Some(stream) => stream.window_recv += i64::from(delta),
            None => return Ok(()),
        }
        let payload = delta.to_be_bytes().to_vec();
        self.frame_write(Frame::new(FrameType::WindowUpdate, FrameFlags::empty(), sid, payload))
    }
}
