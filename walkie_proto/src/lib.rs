#![no_std]
//! Wire format of the push-to-talk audio relay.
//!
//! Every datagram exchanged between boards starts with a fixed 20 byte header,
//! followed by an optional compressed audio payload:
//!
//! | offset | size | field        | notes                                  |
//! |--------|------|--------------|----------------------------------------|
//! | 0      | 4    | `board_id`   | identity of the sender                 |
//! | 4      | 4    | `seq_num`    | per sender, incremented on every send  |
//! | 8      | 4    | `ts_sec`     | wall clock seconds at send time        |
//! | 12     | 4    | `ts_usec`    | microsecond part of the same clock     |
//! | 16     | 2    | `opus_size`  | payload length, at most 4000           |
//! | 18     | 1    | `flags`      | [`Flags::START`], [`Flags::END`], ...  |
//! | 19     | 1    | reserved     | written as zero, ignored on receive    |
//!
//! All multi-byte fields are big-endian.
//!
//! ## Packet kinds
//!
//! A transmission burst is delimited by a [`Flags::START`] packet and a
//! [`Flags::END`] packet, both carrying an empty payload. Packets with neither
//! flag carry exactly one encoded audio frame.
//!
//! Senders only ever put the header and the payload on the wire, never a
//! fixed-size maximal buffer. Receivers must tolerate datagrams shorter than
//! [`MAX_DATAGRAM_LEN`].

pub mod sequence;
pub mod wire;

pub use sequence::SequenceTracker;
pub use wire::{
    Flags, HEADER_LEN, Header, MAX_DATAGRAM_LEN, MAX_PAYLOAD_LEN, Packet, PacketKind, Timestamp,
    WireError,
};
