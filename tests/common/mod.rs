//! Shared test harness: an `Events` sink that records every callback and all
//! emitted bytes, plus builders/parsers for raw frames.

#![allow(dead_code)]

use http_machine::{
    Connection, Error, Events, Frame, FrameType, Kind, Message, Mode, Result, StreamId,
};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const END_STREAM: u8 = 0x1;
pub const ACK: u8 = 0x1;
pub const END_HEADERS: u8 = 0x4;
pub const PADDED: u8 = 0x8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StreamStart(StreamId),
    StreamEnd(StreamId),
    Head {
        id: StreamId,
        code: u32,
        method: String,
        path: String,
        headers: Vec<(String, String)>,
    },
    Push {
        parent: StreamId,
        promised: StreamId,
        method: String,
        path: String,
    },
    Data(StreamId, Vec<u8>),
    Tail {
        id: StreamId,
        trailers: Option<Vec<(String, String)>>,
    },
    Settings,
    FlowIncrease(StreamId),
    Pong([u8; 8]),
    Upgrade,
}

fn render_headers(msg: &Message) -> Vec<(String, String)> {
    msg.headers
        .iter()
        .map(|h| {
            (
                String::from_utf8_lossy(&h.name).into_owned(),
                String::from_utf8_lossy(&h.value).into_owned(),
            )
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub wire: Vec<u8>,
    /// (type, flags, stream) of every frame seen by the observability hook.
    pub frames: Vec<(u8, u8, StreamId)>,
    pub abort_on_head: bool,
}

impl Events for Recorder {
    fn on_writev(&mut self, buffers: &[&[u8]]) -> Result<()> {
        for buffer in buffers {
            self.wire.extend_from_slice(buffer);
        }
        Ok(())
    }

    fn on_stream_start(&mut self, id: StreamId) -> Result<()> {
        self.events.push(Event::StreamStart(id));
        Ok(())
    }

    fn on_stream_end(&mut self, id: StreamId) -> Result<()> {
        self.events.push(Event::StreamEnd(id));
        Ok(())
    }

    fn on_message_head(&mut self, id: StreamId, msg: &Message) -> Result<()> {
        self.events.push(Event::Head {
            id,
            code: msg.code,
            method: String::from_utf8_lossy(&msg.method).into_owned(),
            path: String::from_utf8_lossy(&msg.path).into_owned(),
            headers: render_headers(msg),
        });
        if self.abort_on_head {
            return Err(Error::Assertion("aborted by test"));
        }
        Ok(())
    }

    fn on_message_push(&mut self, id: StreamId, msg: &Message, promised: StreamId) -> Result<()> {
        self.events.push(Event::Push {
            parent: id,
            promised,
            method: String::from_utf8_lossy(&msg.method).into_owned(),
            path: String::from_utf8_lossy(&msg.path).into_owned(),
        });
        Ok(())
    }

    fn on_message_data(&mut self, id: StreamId, data: &[u8]) -> Result<()> {
        self.events.push(Event::Data(id, data.to_vec()));
        Ok(())
    }

    fn on_message_tail(&mut self, id: StreamId, trailers: Option<&Message>) -> Result<()> {
        self.events.push(Event::Tail {
            id,
            trailers: trailers.map(render_headers),
        });
        Ok(())
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push((frame.typ, frame.flags.bits(), frame.stream));
        Ok(())
    }

    fn on_settings(&mut self) -> Result<()> {
        self.events.push(Event::Settings);
        Ok(())
    }

    fn on_flow_increase(&mut self, id: StreamId) -> Result<()> {
        self.events.push(Event::FlowIncrease(id));
        Ok(())
    }

    fn on_pong(&mut self, payload: [u8; 8]) -> Result<()> {
        self.events.push(Event::Pong(payload));
        Ok(())
    }

    fn on_upgrade(&mut self) -> Result<()> {
        self.events.push(Event::Upgrade);
        Ok(())
    }
}

/// A frame as re-parsed from recorded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub typ: u8,
    pub flags: u8,
    pub stream: StreamId,
    pub payload: Vec<u8>,
}

/// Splits concatenated `on_writev` output back into frames.
pub fn parse_frames(wire: &[u8]) -> Vec<WireFrame> {
    let mut frames = Vec::new();
    let mut rest = wire;
    while rest.len() >= 9 {
        let length = u32::from_be_bytes([0, rest[0], rest[1], rest[2]]) as usize;
        assert!(rest.len() >= 9 + length, "truncated frame in output");
        frames.push(WireFrame {
            typ: rest[3],
            flags: rest[4],
            stream: u32::from_be_bytes([rest[5], rest[6], rest[7], rest[8]]) & 0x7FFF_FFFF,
            payload: rest[9..9 + length].to_vec(),
        });
        rest = &rest[9 + length..];
    }
    assert!(rest.is_empty(), "trailing bytes in output");
    frames
}

/// Serializes one frame for feeding into `consume`.
pub fn frame(typ: u8, flags: u8, stream: StreamId, payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u32;
    let mut bytes = vec![
        (length >> 16) as u8,
        (length >> 8) as u8,
        length as u8,
        typ,
        flags,
    ];
    bytes.extend_from_slice(&stream.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn settings_payload(entries: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(entries.len() * 6);
    for &(key, value) in entries {
        payload.extend_from_slice(&key.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    payload
}

pub fn settings_frame(entries: &[(u16, u32)]) -> Vec<u8> {
    frame(FrameType::Settings as u8, 0, 0, &settings_payload(entries))
}

/// HPACK-encodes a header list with the given reference encoder.
pub fn headers_block(encoder: &mut hpack::Encoder<'_>, headers: &[(&[u8], &[u8])]) -> Vec<u8> {
    encoder.encode(headers.iter().copied())
}

/// A server that has finished the h2 handshake, with the recorder wiped.
pub fn h2_server() -> Connection<Recorder> {
    let mut conn = Connection::new(Kind::Server, Recorder::default());
    conn.begin(Mode::Http2).unwrap();
    conn.consume(PREFACE).unwrap();
    conn.consume(&settings_frame(&[])).unwrap();
    reset(&mut conn);
    conn
}

/// A client that has finished the h2 handshake, with the recorder wiped.
pub fn h2_client() -> Connection<Recorder> {
    let mut conn = Connection::new(Kind::Client, Recorder::default());
    conn.begin(Mode::Http2).unwrap();
    conn.consume(&settings_frame(&[])).unwrap();
    reset(&mut conn);
    conn
}

pub fn reset(conn: &mut Connection<Recorder>) {
    let recorder = conn.events_mut();
    recorder.events.clear();
    recorder.wire.clear();
    recorder.frames.clear();
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
