//! Gantry wire format — the packet envelope and its codec.
//!
//! Every packet travels as one frame:
//!
//! ```text
//! +-----------+------------+-----------+---------------+----------------+
//! | size: u32 | id: 16 B   | kind: u32 | checksum: u32 | body           |
//! +-----------+------------+-----------+---------------+----------------+
//! ```
//!
//! All integers are little-endian. `size` counts every byte that follows it
//! (header + body), so it doubles as the socket frame's length prefix.
//! The id width is fixed at 16 bytes and enforced by [`PacketId`]; encode and
//! decode cannot disagree about it.
//!
//! Decoding is pure: no I/O, and on any error the caller gets no packet.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Width of the packet identifier in bytes.
pub const ID_LEN: usize = 16;

/// Width of the size (length prefix) field.
pub const SIZE_LEN: usize = 4;

/// Fixed header after the size field: id + kind + checksum.
pub const HEADER_LEN: usize = ID_LEN + 4 + 4;

/// Default upper bound on a single frame (the value of `size`).
pub const MAX_FRAME_BYTES: u32 = 1_048_576;

// ── Header ────────────────────────────────────────────────────────────────────

/// The fixed portion of a frame that follows the size prefix.
///
/// Wire size: 24 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    /// Correlates requests and responses. Covered by the checksum.
    pub id: [u8; ID_LEN],

    /// Routing tag. See [`Kind`].
    pub kind: U32<LittleEndian>,

    /// Adler-32 over `id ‖ kind ‖ body`. Zero for an empty body.
    pub checksum: U32<LittleEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(PacketHeader, [u8; HEADER_LEN]);

// ── Kind ──────────────────────────────────────────────────────────────────────

/// Packet type tag. Determines routing on the receiving side.
///
/// Two values are reserved by the transport; everything else belongs to the
/// embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kind(pub u32);

impl Kind {
    /// Control packet with an empty body. Never reaches application handlers.
    pub const HEARTBEAT: Kind = Kind(0);

    /// Reply correlated to a request by id. Routed to the response handler.
    pub const RESPONSE: Kind = Kind(1);

    pub const fn new(value: u32) -> Self {
        Kind(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn is_reserved(self) -> bool {
        self == Self::HEARTBEAT || self == Self::RESPONSE
    }
}

impl From<u32> for Kind {
    fn from(value: u32) -> Self {
        Kind(value)
    }
}

impl From<Kind> for u32 {
    fn from(k: Kind) -> u32 {
        k.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::HEARTBEAT => write!(f, "heartbeat"),
            Self::RESPONSE => write!(f, "response"),
            Kind(other) => write!(f, "{other}"),
        }
    }
}

// ── Packet id ─────────────────────────────────────────────────────────────────

/// Fixed-width packet identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketId([u8; ID_LEN]);

impl PacketId {
    /// A fresh random (UUID v4) identifier.
    pub fn random() -> Self {
        PacketId(uuid::Uuid::new_v4().into_bytes())
    }

    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        PacketId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PacketId {
    type Error = WireError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; ID_LEN] = value.try_into().map_err(|_| WireError::Malformed {
            len: value.len(),
            min: ID_LEN,
        })?;
        Ok(PacketId(bytes))
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({})", hex::encode(self.0))
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// Outcome carried in the body of state responses, as a u32 LE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    Success = 0,
    Failed = 1,
}

impl StatusCode {
    pub fn to_body(self) -> [u8; 4] {
        (self as u32).to_le_bytes()
    }

    /// Read the code from the first four bytes of a response body.
    pub fn from_body(body: &[u8]) -> Result<Self, WireError> {
        let raw: [u8; 4] = body
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(WireError::Malformed {
                len: body.len(),
                min: 4,
            })?;
        StatusCode::try_from(u32::from_le_bytes(raw))
    }
}

impl TryFrom<u32> for StatusCode {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Success),
            1 => Ok(StatusCode::Failed),
            other => Err(WireError::UnknownStatus(other)),
        }
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// A decoded or locally constructed packet. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: PacketId,
    kind: Kind,
    checksum: u32,
    body: Bytes,
}

impl Packet {
    /// New packet with a fresh random id.
    pub fn new(kind: Kind, body: impl Into<Bytes>) -> Self {
        Self::with_id(PacketId::random(), kind, body)
    }

    /// New packet with a caller-supplied id (used for correlation).
    pub fn with_id(id: PacketId, kind: Kind, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let checksum = checksum(&id, kind, &body);
        Self {
            id,
            kind,
            checksum,
            body,
        }
    }

    /// Zero-length heartbeat.
    pub fn heartbeat() -> Self {
        Self::new(Kind::HEARTBEAT, Bytes::new())
    }

    /// `Response` packet echoing a request id.
    pub fn response(id: PacketId, body: impl Into<Bytes>) -> Self {
        Self::with_id(id, Kind::RESPONSE, body)
    }

    /// `Response` packet whose body is a [`StatusCode`].
    pub fn state_response(id: PacketId, code: StatusCode) -> Self {
        Self::response(id, Bytes::copy_from_slice(&code.to_body()))
    }

    pub fn success_response(id: PacketId) -> Self {
        Self::state_response(id, StatusCode::Success)
    }

    pub fn failure_response(id: PacketId) -> Self {
        Self::state_response(id, StatusCode::Failed)
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Declared size: the number of bytes following the size field.
    pub fn size(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// True when the stored checksum matches the contents.
    pub fn verify(&self) -> bool {
        self.checksum == checksum(&self.id, self.kind, &self.body)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={} kind={} body_len={} checksum={}",
            self.size(),
            self.kind,
            self.body.len(),
            self.checksum
        )
    }
}

// ── Checksum ──────────────────────────────────────────────────────────────────

const ADLER_MOD: u32 = 65521;
// Largest n such that 255n(n+1)/2 + (n+1)(ADLER_MOD-1) fits in a u32.
const ADLER_NMAX: usize = 5552;

struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    fn write(&mut self, data: &[u8]) {
        for block in data.chunks(ADLER_NMAX) {
            for &byte in block {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= ADLER_MOD;
            self.b %= ADLER_MOD;
        }
    }

    fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// Adler-32 over `id ‖ kind (LE) ‖ body`.
///
/// An empty body yields 0 by convention; a zero checksum says nothing else
/// about the packet.
pub fn checksum(id: &PacketId, kind: Kind, body: &[u8]) -> u32 {
    if body.is_empty() {
        return 0;
    }
    let mut adler = Adler32::new();
    adler.write(id.as_bytes());
    adler.write(&kind.0.to_le_bytes());
    adler.write(body);
    adler.finish()
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Encode a packet as a complete frame, size prefix included.
pub fn encode(packet: &Packet) -> Bytes {
    let header = PacketHeader {
        id: *packet.id.as_bytes(),
        kind: U32::new(packet.kind.0),
        checksum: U32::new(packet.checksum),
    };
    let size = packet.size();
    let mut buf = BytesMut::with_capacity(SIZE_LEN + size);
    buf.put_u32_le(size as u32);
    buf.put_slice(header.as_bytes());
    buf.put_slice(&packet.body);
    buf.freeze()
}

/// Decode the bytes that follow a frame's size prefix.
///
/// Fails with [`WireError::Malformed`] when shorter than the header and with
/// [`WireError::Integrity`] when the checksum disagrees with the contents.
pub fn decode(data: &[u8]) -> Result<Packet, WireError> {
    let header = PacketHeader::read_from_prefix(data).ok_or(WireError::Malformed {
        len: data.len(),
        min: HEADER_LEN,
    })?;

    // Copy packed fields to locals before use.
    let id = PacketId::from_bytes(header.id);
    let kind = Kind(header.kind.get());
    let declared = header.checksum.get();
    let body = Bytes::copy_from_slice(&data[HEADER_LEN..]);

    let computed = checksum(&id, kind, &body);
    if computed != declared {
        return Err(WireError::Integrity { declared, computed });
    }

    Ok(Packet {
        id,
        kind,
        checksum: declared,
        body,
    })
}

/// Decode a complete frame as produced by [`encode`].
pub fn decode_frame(frame: &[u8]) -> Result<Packet, WireError> {
    let prefix: [u8; SIZE_LEN] = frame
        .get(..SIZE_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or(WireError::Malformed {
            len: frame.len(),
            min: SIZE_LEN + HEADER_LEN,
        })?;
    let declared = u32::from_le_bytes(prefix);
    let rest = &frame[SIZE_LEN..];
    if declared as usize != rest.len() {
        return Err(WireError::SizeMismatch {
            declared,
            actual: rest.len(),
        });
    }
    decode(rest)
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed packet: {len} bytes, need at least {min}")]
    Malformed { len: usize, min: usize },

    #[error("checksum mismatch: declared 0x{declared:08x}, computed 0x{computed:08x}")]
    Integrity { declared: u32, computed: u32 },

    #[error("declared size {declared} does not match frame length {actual}")]
    SizeMismatch { declared: u32, actual: usize },

    #[error("unknown status code: {0}")]
    UnknownStatus(u32),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
