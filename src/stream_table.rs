use crate::stream::Stream;
use crate::types::{FrameType, StreamId};

/// Fixed bucket count for the id-keyed stream map.
pub(crate) const STREAM_BUCKETS: usize = 8;

/// How many recently reset stream ids are remembered to tolerate frames the
/// peer sent before it saw our RST_STREAM.
pub(crate) const RESET_HISTORY: usize = 8;

// The wire reserves bit 31 of stream ids, so it is free to mark entries of
// streams that were still expecting HEADERS when reset.
const RESET_EXPECTING_HEADERS: u32 = 1 << 31;

/// All streams of one connection, bucketed by `id % STREAM_BUCKETS`, plus the
/// per-side bookkeeping that stream creation rules depend on: how many each
/// side has open, the highest id each side has used, and the reset ring.
#[derive(Debug, Default)]
pub(crate) struct StreamTable {
    buckets: [Vec<Stream>; STREAM_BUCKETS],
    count: [usize; 2],
    last: [u32; 2],
    recently_reset: [u32; RESET_HISTORY],
    reset_next: usize,
}

impl StreamTable {
    pub fn find(&self, id: StreamId) -> Option<&Stream> {
        self.buckets[id as usize % STREAM_BUCKETS]
            .iter()
            .find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.buckets[id as usize % STREAM_BUCKETS]
            .iter_mut()
            .find(|s| s.id == id)
    }

    /// Highest stream id the given side has opened so far (0 when none).
    pub fn last_id(&self, local: bool) -> StreamId {
        self.last[usize::from(local)]
    }

    pub fn count(&self, local: bool) -> usize {
        self.count[usize::from(local)]
    }

    /// Links a new stream and moves the side's id watermark. The caller has
    /// already validated parity, monotonicity, and the concurrency limit.
    pub fn insert(&mut self, id: StreamId, local: bool) {
        self.last[usize::from(local)] = id;
        self.count[usize::from(local)] += 1;
        self.buckets[id as usize % STREAM_BUCKETS].push(Stream::new(id, local));
    }

    pub fn remove(&mut self, id: StreamId, local: bool) -> Option<Stream> {
        let bucket = &mut self.buckets[id as usize % STREAM_BUCKETS];
        let position = bucket.iter().position(|s| s.id == id)?;
        self.count[usize::from(local)] -= 1;
        Some(bucket.swap_remove(position))
    }

    /// Every live stream id, for connection teardown.
    pub fn ids(&self) -> Vec<StreamId> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|s| s.id))
            .collect()
    }

    /// Remembers a locally reset stream so late frames from the peer can be
    /// told apart from frames on streams that never existed.
    pub fn record_reset(&mut self, id: StreamId, expecting_headers: bool) {
        let marker = if expecting_headers {
            RESET_EXPECTING_HEADERS
        } else {
            0
        };
        self.recently_reset[self.reset_next] = id | marker;
        self.reset_next = (self.reset_next + 1) % RESET_HISTORY;
    }

    /// Whether a late frame of type `typ` on `id` should be dropped silently.
    /// A stream reset mid-body tolerates anything but HEADERS; one reset
    /// while still expecting HEADERS tolerates anything but DATA (those
    /// HEADERS still have to be decoded to keep compression state in sync).
    pub fn tolerates(&self, id: StreamId, typ: u8) -> bool {
        self.recently_reset.iter().any(|&entry| {
            (typ != FrameType::Headers as u8 && entry == id)
                || (typ != FrameType::Data as u8 && entry == (id | RESET_EXPECTING_HEADERS))
        })
    }
}
