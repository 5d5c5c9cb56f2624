use bytes::{Buf, BufMut};

use crate::evs::error::DecodeError;
use crate::evs::node_id::NodeId;
use crate::evs::seqno::SeqRange;

/// Attributes a range of sequence numbers to one node. Whether the range is
///  missing (a retransmission request) or redundant (safe to discard) is decided
///  by the message carrying the gap, not by the gap itself.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Gap {
    pub source: NodeId,
    pub range: SeqRange,
}

impl Gap {
    pub const SERIALIZED_SIZE: usize = NodeId::SERIALIZED_SIZE + SeqRange::SERIALIZED_SIZE;

    pub fn new(source: NodeId, range: SeqRange) -> Gap {
        Gap {
            source,
            range,
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        self.source.ser(buf);
        self.range.ser(buf);
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<Gap, DecodeError> {
        let source = NodeId::try_deser(buf)?;
        let range = SeqRange::try_deser(buf)?;
        Ok(Gap {
            source,
            range,
        })
    }
}
