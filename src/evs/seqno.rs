use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut};

use crate::evs::error::DecodeError;

/// A sequence number in the circular u32 domain used for message ordering. The
///  maximum u32 value is reserved as the 'unknown' sentinel ("no sequence number
///  known / assigned yet") and is never a valid position in the sequence, so all
///  arithmetic has to go through the guarded operations below.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SeqNo(pub u32);

impl SeqNo {
    /// reserved sentinel, not a valid position in the sequence
    pub const UNKNOWN: SeqNo = SeqNo(u32::MAX);

    pub const SERIALIZED_SIZE: usize = size_of::<u32>();

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }

    /// successor in the circular sequence domain, `None` for the unknown sentinel.
    ///  The domain wraps around just below the sentinel, so a successor is never
    ///  the sentinel itself.
    pub fn next(self) -> Option<SeqNo> {
        self.advance(1)
    }

    /// the sequence number `n` positions after this one, `None` for the unknown
    ///  sentinel. This is how the highest sequence number covered by a user
    ///  message is derived from its starting number and range count.
    pub fn advance(self, n: u8) -> Option<SeqNo> {
        if self.is_known() {
            Some(SeqNo(((self.0 as u64 + n as u64) % Self::UNKNOWN.0 as u64) as u32))
        }
        else {
            None
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.0);
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<SeqNo, DecodeError> {
        Ok(SeqNo(buf.try_get_u32()?))
    }
}

impl Debug for SeqNo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_known() {
            write!(f, "{}", self.0)
        }
        else {
            write!(f, "?")
        }
    }
}


/// A closed inclusive interval of sequence numbers. The default instance has
///  both ends set to the unknown sentinel and stands for "no range".
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct SeqRange {
    pub low: SeqNo,
    pub high: SeqNo,
}

impl SeqRange {
    pub const SERIALIZED_SIZE: usize = 2 * SeqNo::SERIALIZED_SIZE;

    pub fn new(low: SeqNo, high: SeqNo) -> SeqRange {
        SeqRange {
            low,
            high,
        }
    }

    /// a range with either end unknown covers nothing
    pub fn is_empty(&self) -> bool {
        !self.low.is_known() || !self.high.is_known()
    }

    pub fn contains(&self, seq: SeqNo) -> bool {
        !self.is_empty()
            && seq.is_known()
            && self.low <= seq
            && seq <= self.high
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        self.low.ser(buf);
        self.high.ser(buf);
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<SeqRange, DecodeError> {
        let low = SeqNo::try_deser(buf)?;
        let high = SeqNo::try_deser(buf)?;
        Ok(SeqRange {
            low,
            high,
        })
    }
}

impl Default for SeqRange {
    fn default() -> SeqRange {
        SeqRange {
            low: SeqNo::UNKNOWN,
            high: SeqNo::UNKNOWN,
        }
    }
}

impl Debug for SeqRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}:{:?}]", self.low, self.high)
    }
}
