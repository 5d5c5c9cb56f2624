//! Binary wire representation of [EvsMessage] - a versioned interoperability
//!  contract, so every byte offset and tag value here is load-bearing. All
//!  numbers are in network byte order (BE).
//!
//! Byte 0 is shared by all variants: low nibble wire version, high nibble
//!  variant tag. The fixed-header variants follow with fixed-size fields only;
//!  join / install append their membership collections, each as a 2-byte entry
//!  count followed by that many fixed-size entries.
//!
//! User message layout:
//! ```ascii
//!     0                   1                   2                   3
//!     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  0 |tag|ver| safety prefix | seq range     | flags         |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  4 | seq                                                           |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  8 | aru seq                                                       |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! 12 | source view (discriminator, sequence)                         |
//! 16 |                                                               |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//! Delegate, gap and leave put three reserved zero bytes after byte 0 so their
//!  fixed-size fields start at offset 4; join / install do the same for their
//!  fixed header (view, aru seq, safe seq) before the collections.

use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::debug;

use crate::evs::error::{DecodeError, EncodeError};
use crate::evs::gap::Gap;
use crate::evs::messages::{DelegateData, EvsMessage, GapData, LeaveData, MembershipData, MessageFlags, SafetyPrefix, UserData};
use crate::evs::node_id::NodeId;
use crate::evs::seqno::{SeqNo, SeqRange};
use crate::evs::view_id::ViewId;
use crate::util::fixed_buf::ArrayBuf;

/// wire compatibility marker in the low nibble of byte 0. Decoding checks this
///  before interpreting anything else and rejects the whole message on a
///  mismatch - there is no partial interpretation of foreign versions.
pub const WIRE_VERSION: u8 = 0;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum MessageTag {
    User = 0,
    Delegate = 1,
    Gap = 2,
    Join = 3,
    Leave = 4,
    Install = 5,
}

/// reserved bytes between the tag byte and the first four-byte field; written
///  as zero, not interpreted on decode
const RESERVED_PADDING: usize = 3;

const ENTRY_COUNT_SIZE: usize = size_of::<u16>();
const MAX_COLLECTION_ENTRIES: usize = u16::MAX as usize;

const OPERATIONAL_ENTRY_SIZE: usize = NodeId::SERIALIZED_SIZE + SeqRange::SERIALIZED_SIZE;

/// Caller-owned scratch space for [EvsMessage::header_view], sized to hold
///  every fixed-header variant. A join / install message with a membership
///  payload beyond this capacity has to go through [EvsMessage::encode] with a
///  real buffer instead.
pub const HEADER_CAPACITY: usize = 32;
pub type HeaderBuf = ArrayBuf<HEADER_CAPACITY>;

impl EvsMessage {
    pub fn tag(&self) -> MessageTag {
        match self {
            EvsMessage::User(_) => MessageTag::User,
            EvsMessage::Delegate(_) => MessageTag::Delegate,
            EvsMessage::Gap(_) => MessageTag::Gap,
            EvsMessage::Join(_) => MessageTag::Join,
            EvsMessage::Leave(_) => MessageTag::Leave,
            EvsMessage::Install(_) => MessageTag::Install,
        }
    }

    /// the exact number of bytes [EvsMessage::encode] writes for this message
    pub fn wire_size(&self) -> usize {
        match self {
            EvsMessage::User(_) => 4 + 2 * SeqNo::SERIALIZED_SIZE + ViewId::SERIALIZED_SIZE,
            EvsMessage::Delegate(_) => 1 + RESERVED_PADDING + NodeId::SERIALIZED_SIZE,
            EvsMessage::Gap(_) => 1 + RESERVED_PADDING + SeqNo::SERIALIZED_SIZE + Gap::SERIALIZED_SIZE,
            EvsMessage::Leave(_) => 1 + RESERVED_PADDING + ViewId::SERIALIZED_SIZE,
            EvsMessage::Join(m) | EvsMessage::Install(m) => Self::membership_wire_size(m),
        }
    }

    fn membership_wire_size(m: &MembershipData) -> usize {
        1 + RESERVED_PADDING + ViewId::SERIALIZED_SIZE + 2 * SeqNo::SERIALIZED_SIZE
            + ENTRY_COUNT_SIZE + m.operational().len() * OPERATIONAL_ENTRY_SIZE
            + ENTRY_COUNT_SIZE + m.untrusted().len() * NodeId::SERIALIZED_SIZE
            + ENTRY_COUNT_SIZE + m.unoperational().len() * NodeId::SERIALIZED_SIZE
    }

    /// Encode this message into `buf`, returning the number of bytes written.
    ///  All checks happen before the first byte is written, so a failed encode
    ///  leaves the buffer exactly as it was. Encoding the same message twice
    ///  yields identical bytes.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<usize, EncodeError> {
        let size = self.wire_size();
        if buf.remaining_mut() < size {
            return Err(EncodeError::BufferTooShort {
                needed: size,
                available: buf.remaining_mut(),
            });
        }
        if let EvsMessage::Join(m) | EvsMessage::Install(m) = self {
            Self::check_entry_count(m.operational().len())?;
            Self::check_entry_count(m.untrusted().len())?;
            Self::check_entry_count(m.unoperational().len())?;
        }

        buf.put_u8(((u8::from(self.tag()) << 4) & 0xf0) | (WIRE_VERSION & 0x0f));
        match self {
            EvsMessage::User(data) => {
                buf.put_u8(u8::from(data.safety_prefix) & 0x0f);
                buf.put_u8(data.seq_range);
                buf.put_u8(data.flags.bits());
                data.seq.ser(buf);
                data.aru_seq.ser(buf);
                data.source_view.ser(buf);
            }
            EvsMessage::Delegate(data) => {
                Self::put_reserved(buf);
                data.source.ser(buf);
            }
            EvsMessage::Gap(data) => {
                Self::put_reserved(buf);
                data.seq.ser(buf);
                data.gap.ser(buf);
            }
            EvsMessage::Leave(data) => {
                Self::put_reserved(buf);
                data.source_view.ser(buf);
            }
            EvsMessage::Join(m) | EvsMessage::Install(m) => {
                Self::ser_membership(m, buf);
            }
        }
        Ok(size)
    }

    fn check_entry_count(count: usize) -> Result<(), EncodeError> {
        if count > MAX_COLLECTION_ENTRIES {
            return Err(EncodeError::CollectionTooLarge {
                count,
                max: MAX_COLLECTION_ENTRIES,
            });
        }
        Ok(())
    }

    fn put_reserved(buf: &mut impl BufMut) {
        for _ in 0..RESERVED_PADDING {
            buf.put_u8(0);
        }
    }

    fn ser_membership(m: &MembershipData, buf: &mut impl BufMut) {
        Self::put_reserved(buf);
        m.source_view.ser(buf);
        m.aru_seq.ser(buf);
        m.safe_seq.ser(buf);

        buf.put_u16(m.operational().len() as u16);
        for (node, range) in m.operational() {
            node.ser(buf);
            range.ser(buf);
        }
        buf.put_u16(m.untrusted().len() as u16);
        for node in m.untrusted() {
            node.ser(buf);
        }
        buf.put_u16(m.unoperational().len() as u16);
        for node in m.unoperational() {
            node.ser(buf);
        }
    }

    /// Decode one message from the start of `buf`, returning it together with
    ///  the number of bytes it occupied. Trailing bytes are left alone - the
    ///  enclosing framing decides what they mean.
    pub fn decode(buf: &[u8]) -> Result<(EvsMessage, usize), DecodeError> {
        let mut cursor = buf;
        let msg = Self::try_deser(&mut cursor)?;
        Ok((msg, buf.len() - cursor.len()))
    }

    fn try_deser(buf: &mut impl Buf) -> Result<EvsMessage, DecodeError> {
        let b = buf.try_get_u8()?;
        let version = b & 0x0f;
        if version != WIRE_VERSION {
            debug!("rejecting message with unsupported wire version {}", version);
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let raw_tag = (b >> 4) & 0x0f;
        let tag = MessageTag::try_from_primitive(raw_tag)
            .map_err(|_| {
                debug!("rejecting message with unknown tag {}", raw_tag);
                DecodeError::UnknownTag(raw_tag)
            })?;

        match tag {
            MessageTag::User => Self::deser_user(buf),
            MessageTag::Delegate => Self::deser_delegate(buf),
            MessageTag::Gap => Self::deser_gap(buf),
            MessageTag::Join => Ok(EvsMessage::Join(Self::deser_membership(buf)?)),
            MessageTag::Leave => Self::deser_leave(buf),
            MessageTag::Install => Ok(EvsMessage::Install(Self::deser_membership(buf)?)),
        }
    }

    fn deser_user(buf: &mut impl Buf) -> Result<EvsMessage, DecodeError> {
        let b = buf.try_get_u8()?;
        // the upper nibble is reserved; it is masked off rather than rejected
        let safety_prefix = SafetyPrefix::try_from_primitive(b & 0x0f)
            .map_err(|_| DecodeError::InvalidSafetyPrefix(b & 0x0f))?;
        let seq_range = buf.try_get_u8()?;
        let flags = MessageFlags::from_bits_retain(buf.try_get_u8()?);
        let seq = SeqNo::try_deser(buf)?;
        let aru_seq = SeqNo::try_deser(buf)?;
        let source_view = ViewId::try_deser(buf)?;

        Ok(EvsMessage::User(UserData {
            safety_prefix,
            seq,
            seq_range,
            aru_seq,
            flags,
            source_view,
        }))
    }

    fn deser_delegate(buf: &mut impl Buf) -> Result<EvsMessage, DecodeError> {
        Self::skip_reserved(buf)?;
        let source = NodeId::try_deser(buf)?;

        Ok(EvsMessage::Delegate(DelegateData {
            source,
        }))
    }

    fn deser_gap(buf: &mut impl Buf) -> Result<EvsMessage, DecodeError> {
        Self::skip_reserved(buf)?;
        let seq = SeqNo::try_deser(buf)?;
        let gap = Gap::try_deser(buf)?;

        Ok(EvsMessage::Gap(GapData {
            seq,
            gap,
        }))
    }

    fn deser_leave(buf: &mut impl Buf) -> Result<EvsMessage, DecodeError> {
        Self::skip_reserved(buf)?;
        let source_view = ViewId::try_deser(buf)?;

        Ok(EvsMessage::Leave(LeaveData {
            source_view,
        }))
    }

    fn deser_membership(buf: &mut impl Buf) -> Result<MembershipData, DecodeError> {
        Self::skip_reserved(buf)?;
        let source_view = ViewId::try_deser(buf)?;
        let aru_seq = SeqNo::try_deser(buf)?;
        let safe_seq = SeqNo::try_deser(buf)?;
        let mut membership = MembershipData::new(source_view, aru_seq, safe_seq);

        let num_operational = Self::try_get_entry_count(buf, OPERATIONAL_ENTRY_SIZE)?;
        for _ in 0..num_operational {
            let node = NodeId::try_deser(buf)?;
            let range = SeqRange::try_deser(buf)?;
            membership.add_operational(node, range)
                .map_err(|_| DecodeError::DuplicateMember(node))?;
        }

        let num_untrusted = Self::try_get_entry_count(buf, NodeId::SERIALIZED_SIZE)?;
        for _ in 0..num_untrusted {
            let node = NodeId::try_deser(buf)?;
            membership.add_untrusted(node)
                .map_err(|_| DecodeError::DuplicateMember(node))?;
        }

        let num_unoperational = Self::try_get_entry_count(buf, NodeId::SERIALIZED_SIZE)?;
        for _ in 0..num_unoperational {
            let node = NodeId::try_deser(buf)?;
            membership.add_unoperational(node)
                .map_err(|_| DecodeError::DuplicateMember(node))?;
        }

        Ok(membership)
    }

    /// An entry count is only plausible if its entries could actually fit into
    ///  the remaining buffer - checking this up front keeps a corrupt or
    ///  malicious count from driving allocation.
    fn try_get_entry_count(buf: &mut impl Buf, entry_size: usize) -> Result<usize, DecodeError> {
        let count = buf.try_get_u16()? as usize;
        let needed = count * entry_size;
        if buf.remaining() < needed {
            debug!("rejecting message with implausible entry count {}", count);
            return Err(DecodeError::ImplausibleLength {
                count,
                needed,
                available: buf.remaining(),
            });
        }
        Ok(count)
    }

    fn skip_reserved(buf: &mut impl Buf) -> Result<(), DecodeError> {
        for _ in 0..RESERVED_PADDING {
            buf.try_get_u8()?;
        }
        Ok(())
    }

    /// Fast path for callers that need the encoded header bytes without setting
    ///  up a real output buffer: encodes into the caller-owned fixed-capacity
    ///  scratch and returns the written prefix. Fails like [EvsMessage::encode]
    ///  if the message does not fit, which makes this unusable for join /
    ///  install messages with more than a trivial membership payload.
    pub fn header_view<'a>(&self, scratch: &'a mut HeaderBuf) -> Result<&'a [u8], EncodeError> {
        scratch.clear();
        self.encode(scratch)?;
        Ok((*scratch).as_ref())
    }
}
