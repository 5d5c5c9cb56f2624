use crate::evs::node_id::NodeId;

/// A contract violation while assembling a message. The caller must not try to
///  salvage a partially assembled message after one of these.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum ConstructionError {
    #[error("membership entry for {0:?} is already present")]
    DuplicateMember(NodeId),
}

/// Encoding failed without writing anything; recoverable by retrying with a
///  bigger buffer (or, for oversized collections, by not building such a
///  message in the first place).
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("destination buffer too short: message needs {needed} bytes, buffer has {available}")]
    BufferTooShort { needed: usize, available: usize },
    #[error("membership collection with {count} entries exceeds the wire limit of {max}")]
    CollectionTooLarge { count: usize, max: usize },
}

/// The buffer does not hold a well-formed message; the whole message must be
///  discarded. All of these are detectable from the buffer alone.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer truncated: needed {requested} more bytes, {available} available")]
    Truncated { requested: usize, available: usize },
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("invalid safety prefix {0}")]
    InvalidSafetyPrefix(u8),
    #[error("length prefix of {count} entries needs {needed} bytes but only {available} remain")]
    ImplausibleLength { count: usize, needed: usize, available: usize },
    #[error("duplicate membership entry for {0:?} on the wire")]
    DuplicateMember(NodeId),
}

impl From<bytes::TryGetError> for DecodeError {
    fn from(e: bytes::TryGetError) -> DecodeError {
        DecodeError::Truncated {
            requested: e.requested,
            available: e.available,
        }
    }
}
