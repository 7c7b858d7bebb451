use bytes::Bytes;

/// Cap on header fields per message head (h1 tokenizer array size; h2 header
/// lists are bounded by the CONTINUATION cap instead).
pub(crate) const MAX_HEADERS: usize = 128;

/// One header field. Names are kept as raw octets: HTTP/2 never promises
/// UTF-8, and the engine only ever compares them against ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: Bytes,
    pub value: Bytes,
}

impl Header {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A request or response head, protocol-agnostic. Requests carry `method` and
/// `path` with `code == 0`; responses carry `code` with both paths empty.
/// `:authority` and `:scheme` travel in `headers` like any other field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub code: u32,
    pub method: Bytes,
    pub path: Bytes,
    pub headers: Vec<Header>,
}

impl Message {
    pub fn request(method: impl Into<Bytes>, path: impl Into<Bytes>, headers: Vec<Header>) -> Self {
        Self {
            code: 0,
            method: method.into(),
            path: path.into(),
            headers,
        }
    }

    #[must_use]
    pub fn response(code: u32, headers: Vec<Header>) -> Self {
        Self {
            code,
            method: Bytes::new(),
            path: Bytes::new(),
            headers,
        }
    }

    /// First header with the given (lowercase) name.
    #[must_use]
    pub fn header(&self, name: &[u8]) -> Option<&Bytes> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| &h.value)
    }

    #[must_use]
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }
}

/// Maps RFC 7230 tchar octets to themselves with ASCII uppercase folded to
/// lowercase; everything else (including `:`) maps to 0. Indexing with a
/// header-name octet answers both "is it legal" and "what is its h2 form".
pub(crate) static HEADER_TRANSFORM: [u8; 256] = build_header_transform();

const fn build_header_transform() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let octet = i as u8;
        if octet.is_ascii_lowercase()
            || octet.is_ascii_digit()
            || matches!(
                octet,
                b'!' | b'#'
                    | b'$'
                    | b'%'
                    | b'&'
                    | b'\''
                    | b'*'
                    | b'+'
                    | b'-'
                    | b'.'
                    | b'^'
                    | b'_'
                    | b'`'
                    | b'|'
                    | b'~'
            )
        {
            table[i] = octet;
        } else if octet.is_ascii_uppercase() {
            table[i] = octet.to_ascii_lowercase();
        }
        i += 1;
    }
    table
}

/// Whether a received h2 header name is already in its required form
/// (lowercase tchars only). Uppercase is a violation, not something to fix.
pub(crate) fn valid_header_name(name: &[u8]) -> bool {
    name.iter().all(|&octet| HEADER_TRANSFORM[octet as usize] == octet)
}

/// Lowercases an h1 header name into its h2 form; `None` if any octet is not
/// a tchar at all.
pub(crate) fn normalize_header_name(name: &[u8]) -> Option<Vec<u8>> {
    let mut normalized = Vec::with_capacity(name.len());
    for &octet in name {
        match HEADER_TRANSFORM[octet as usize] {
            0 => return None,
            folded => normalized.push(folded),
        }
    }
    Some(normalized)
}

/// Plain decimal with no sign, whitespace, or overflow. An empty value parses
/// to zero, matching how a missing digit run reads on the wire.
pub(crate) fn parse_uint(value: &[u8]) -> Option<u64> {
    value.iter().try_fold(0u64, |total, &octet| {
        if !octet.is_ascii_digit() {
            return None;
        }
        total
            .checked_mul(10)?
            .checked_add(u64::from(octet - b'0'))
    })
}
