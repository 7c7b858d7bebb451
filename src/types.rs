use num_derive::{FromPrimitive, ToPrimitive};

/// 31-bit stream identifier; the wire's reserved high bit is always masked off.
pub type StreamId = u32;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the embedder. Peer misbehavior that can be answered on
/// the wire (RST_STREAM) is handled internally and never shows up here; these
/// are the conditions that end the connection or reject a local call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The peer or local policy closed the connection.
    #[error("connection closed")]
    Disconnect,
    /// The peer sent GOAWAY with a nonzero error code.
    #[error("peer went away: {0:?}")]
    PeerError(ErrorType),
    /// The peer violated the protocol; a GOAWAY has already been emitted
    /// where the connection was still writable.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Local misuse of the writer API; nothing was sent.
    #[error("invalid stream: {0}")]
    InvalidStream(&'static str),
    /// Stream-limit backpressure; retry after `on_stream_end`.
    #[error("would block: {0}")]
    WouldBlock(&'static str),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    /// A caller-side contract violation.
    #[error("assertion failed: {0}")]
    Assertion(&'static str),
}

/// https://httpwg.org/specs/rfc7540.html#FrameTypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    ResetStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

/// https://httpwg.org/specs/rfc7540.html#ErrorCodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum ErrorType {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

/// https://httpwg.org/specs/rfc7540.html#SettingValues
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    FromPrimitive,
    ToPrimitive,
    enum_map::Enum,
)]
#[repr(u16)]
#[non_exhaustive]
pub enum SettingsParameter {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}
