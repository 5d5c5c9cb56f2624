use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut};

use crate::evs::error::DecodeError;

/// Fixed-size opaque address identifying one cluster member, both as the sender
///  of messages and as the subject of gap / membership records.
///
/// An id is technically a u64; how the eight bytes are assigned (derived from a
///  network address, configured, ...) is up to the process bootstrap and of no
///  concern at this level - all that is required here is that ids are unique per
///  member, comparable and orderable.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const SERIALIZED_SIZE: usize = size_of::<u64>();

    pub const fn new(value: &[u8; 8]) -> NodeId {
        Self(u64::from_be_bytes(*value))
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.0);
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<NodeId, DecodeError> {
        Ok(NodeId(buf.try_get_u64()?))
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{:016x}", self.0)
    }
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::zero(NodeId(0), b"\x00\x00\x00\x00\x00\x00\x00\x00")]
    #[case::pattern(NodeId(0x0102030405060708), b"\x01\x02\x03\x04\x05\x06\x07\x08")]
    #[case::from_bytes(NodeId::new(b"\xff\x00\x00\x00\x00\x00\x00\x01"), b"\xff\x00\x00\x00\x00\x00\x00\x01")]
    fn test_ser(#[case] node: NodeId, #[case] expected: &[u8]) {
        let mut buf = bytes::BytesMut::new();
        node.ser(&mut buf);
        assert_eq!(buf.as_ref(), expected);

        let mut reader: &[u8] = &buf;
        assert_eq!(NodeId::try_deser(&mut reader).unwrap(), node);
        assert!(reader.is_empty());
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::seven_bytes(b"\x01\x02\x03\x04\x05\x06\x07")]
    fn test_deser_truncated(#[case] mut buf: &[u8]) {
        assert!(matches!(NodeId::try_deser(&mut buf), Err(DecodeError::Truncated { .. })));
    }

    #[rstest]
    #[case::zero(NodeId(0), "N0000000000000000")]
    #[case::pattern(NodeId(0xabc), "N0000000000000abc")]
    fn test_debug(#[case] node: NodeId, #[case] expected: &str) {
        assert_eq!(format!("{:?}", node), expected);
    }
}
