//! A transport-agnostic HTTP/1.x + HTTP/2 connection engine.
//!
//! The engine is a pure state machine: the embedder owns the socket (and TLS,
//! and the event loop) and feeds received bytes into
//! [`Connection::consume`]; the engine parses both protocol generations
//! behind one event surface, tracks stream lifecycles and flow-control
//! windows, and pushes serialized output back through
//! [`Events::on_writev`]. Responses, pushes, pings, and resets go out through
//! the `write_*` calls on [`Connection`].
//!
//! Header compression and h1 head tokenization are delegated to the `hpack`
//! and `httparse` crates; everything in between - framing, CONTINUATION
//! coalescence, pseudo-header validation, the h2c upgrade dance - lives here.

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_possible_truncation
)]

mod connection;
mod events;
mod flags;
mod frame;
mod h1;
mod hpack;
mod message;
mod settings;
mod stream;
mod stream_table;
mod types;

pub use bytes::Bytes;
pub use connection::{Connection, Kind, Mode};
pub use events::Events;
pub use flags::FrameFlags;
pub use frame::{Frame, FrameHeader, FRAME_HEADER_LEN};
pub use message::{Header, Message};
pub use settings::Settings;
pub use types::{Error, ErrorType, FrameType, Result, SettingsParameter, StreamId};
