//! Header layout, packet validation and byte-level encoding.

use core::{fmt, ops};

/// Largest compressed frame a packet may carry.
pub const MAX_PAYLOAD_LEN: usize = 4000;

pub const HEADER_LEN: usize =
    // board id
    size_of::<u32>()
        // sequence number
        .strict_add(size_of::<u32>())
        // timestamp, seconds
        .strict_add(size_of::<u32>())
        // timestamp, microseconds
        .strict_add(size_of::<u32>())
        // payload size
        .strict_add(size_of::<u16>())
        // flags
        .strict_add(size_of::<u8>())
        // reserved
        .strict_add(size_of::<u8>());

pub const MAX_DATAGRAM_LEN: usize = HEADER_LEN.strict_add(MAX_PAYLOAD_LEN);

/// Bit set carried in the header's `flags` byte.
///
/// Unknown bits are preserved as-is, so that newer senders don't get their
/// packets rejected by older receivers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Self = Self(0);
    /// First packet of a transmission burst.
    pub const START: Self = Self(0x01);
    /// Last packet of a transmission burst.
    pub const END: Self = Self(0x02);
    /// Reserved for prioritised traffic, never interpreted by the relay.
    pub const PRIORITY: Self = Self(0x04);

    #[inline(always)]
    pub const fn from_bits_retain(bits: u8) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline(always)]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl ops::BitOr for Flags {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Wall-clock send time, split the way `gettimeofday` reports it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub secs: u32,
    pub micros: u32,
}

impl Timestamp {
    /// Truncates a duration since the unix epoch to the header's resolution.
    ///
    /// Seconds wrap around past `u32::MAX`, like the 32-bit field on the wire.
    #[inline]
    pub const fn from_unix(since_epoch: core::time::Duration) -> Self {
        Self {
            secs: since_epoch.as_secs() as u32,
            micros: since_epoch.subsec_micros(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Start,
    End,
    Audio,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "START",
            Self::End => "END",
            Self::Audio => "audio",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram of {len} bytes is shorter than its header and payload require")]
    Truncated { len: usize },
    #[error("payload of {len} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge { len: usize },
    #[error("START and END flags are both set")]
    ConflictingFlags,
    #[error("control packet carries a {len} byte payload")]
    ControlWithPayload { len: usize },
}

/// Decoded form of the fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub board_id: u32,
    pub seq_num: u32,
    pub timestamp: Timestamp,
    pub payload_len: u16,
    pub flags: Flags,
}

impl Header {
    /// Which kind of packet this header announces, provided it is valid.
    pub fn kind(&self) -> Result<PacketKind, WireError> {
        let len = usize::from(self.payload_len);

        if len > MAX_PAYLOAD_LEN {
            return Err(WireError::PayloadTooLarge { len });
        }

        let start = self.flags.contains(Flags::START);
        let end = self.flags.contains(Flags::END);

        let kind = match (start, end) {
            (true, true) => return Err(WireError::ConflictingFlags),
            (true, false) => PacketKind::Start,
            (false, true) => PacketKind::End,
            (false, false) => PacketKind::Audio,
        };

        if kind != PacketKind::Audio && len != 0 {
            return Err(WireError::ControlWithPayload { len });
        }

        Ok(kind)
    }

    fn write(&self, buf: &mut [u8; HEADER_LEN]) {
        let (board_id, rem) = buf.split_first_chunk_mut().unwrap();
        *board_id = self.board_id.to_be_bytes();

        let (seq_num, rem) = rem.split_first_chunk_mut().unwrap();
        *seq_num = self.seq_num.to_be_bytes();

        let (secs, rem) = rem.split_first_chunk_mut().unwrap();
        *secs = self.timestamp.secs.to_be_bytes();

        let (micros, rem) = rem.split_first_chunk_mut().unwrap();
        *micros = self.timestamp.micros.to_be_bytes();

        let (payload_len, rem) = rem.split_first_chunk_mut().unwrap();
        *payload_len = self.payload_len.to_be_bytes();

        let ([flags, reserved], _rem) = rem.split_first_chunk_mut().unwrap();
        *flags = self.flags.bits();
        *reserved = 0;
    }

    fn read(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (&board_id, rem) = bytes.split_first_chunk()?;
        let (&seq_num, rem) = rem.split_first_chunk()?;
        let (&secs, rem) = rem.split_first_chunk()?;
        let (&micros, rem) = rem.split_first_chunk()?;
        let (&payload_len, rem) = rem.split_first_chunk()?;
        let (&[flags, _reserved], rem) = rem.split_first_chunk()?;

        let header = Self {
            board_id: u32::from_be_bytes(board_id),
            seq_num: u32::from_be_bytes(seq_num),
            timestamp: Timestamp {
                secs: u32::from_be_bytes(secs),
                micros: u32::from_be_bytes(micros),
            },
            payload_len: u16::from_be_bytes(payload_len),
            flags: Flags::from_bits_retain(flags),
        };

        Some((header, rem))
    }
}

/// A validated packet, borrowing its payload.
///
/// Construction, through [`Packet::new`] or [`Packet::decode`], enforces that
/// the payload fits, that START and END are exclusive, and that control packets
/// are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    header: Header,
    kind: PacketKind,
    payload: &'a [u8],
}

impl<'a> Packet<'a> {
    pub fn new(
        board_id: u32,
        seq_num: u32,
        timestamp: Timestamp,
        flags: Flags,
        payload: &'a [u8],
    ) -> Result<Self, WireError> {
        let payload_len = u16::try_from(payload.len())
            .map_err(|_| WireError::PayloadTooLarge { len: payload.len() })?;

        let header = Header {
            board_id,
            seq_num,
            timestamp,
            payload_len,
            flags,
        };

        Ok(Self {
            kind: header.kind()?,
            header,
            payload,
        })
    }

    /// Parses a received datagram.
    ///
    /// Bytes past the announced payload length are ignored.
    pub fn decode(datagram: &'a [u8]) -> Result<Self, WireError> {
        let truncated = WireError::Truncated {
            len: datagram.len(),
        };

        let (header, rem) = Header::read(datagram).ok_or(truncated)?;
        let kind = header.kind()?;
        let payload = rem
            .get(..usize::from(header.payload_len))
            .ok_or(truncated)?;

        Ok(Self {
            header,
            kind,
            payload,
        })
    }

    /// Number of bytes [`encode_into`](Self::encode_into) writes.
    #[inline(always)]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN.strict_add(self.payload.len())
    }

    /// Writes the header followed by the payload, returning the number of bytes written,
    /// or `None` if `buf` is too short.
    pub fn encode_into(&self, buf: &mut [u8]) -> Option<usize> {
        let (header, rem) = buf.split_first_chunk_mut()?;
        self.header.write(header);
        rem.get_mut(..self.payload.len())?
            .copy_from_slice(self.payload);

        Some(self.encoded_len())
    }

    /// Same as [`encode_into`](Self::encode_into), into an exactly sized stack buffer.
    pub fn encode(&self) -> arrayvec::ArrayVec<u8, MAX_DATAGRAM_LEN> {
        let mut header = [0; HEADER_LEN];
        self.header.write(&mut header);

        let mut datagram = arrayvec::ArrayVec::new_const();
        datagram.extend(header);
        // validated on construction
        datagram.try_extend_from_slice(self.payload).unwrap();
        datagram
    }

    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline(always)]
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    #[inline(always)]
    pub fn board_id(&self) -> u32 {
        self.header.board_id
    }

    #[inline(always)]
    pub fn seq_num(&self) -> u32 {
        self.header.seq_num
    }

    #[inline(always)]
    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    #[inline(always)]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
