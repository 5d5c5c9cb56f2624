use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut};
use rand::Rng;
use tracing::debug;

use crate::evs::error::DecodeError;
use crate::evs::node_id::NodeId;

#[cfg_attr(test, mockall::automock)]
pub trait ViewIdRandom {
    fn next_u32() -> u32;
}
pub struct RngViewIdRandom {}
impl ViewIdRandom for RngViewIdRandom {
    fn next_u32() -> u32 {
        rand::rng().next_u32()
    }
}

/// Epoch marker identifying one view, i.e. one stable membership snapshot. It
///  combines a random discriminator, drawn once when the view is proposed and
///  fixed for the view's lifetime, with a sequence number that grows monotonically
///  within one membership lineage.
///
/// The discriminator keeps views from different lineages apart (e.g. after a
///  partition, both sides propose views with the same sequence); it does not have
///  to be cryptographically strong, just not trivially colliding. Two views
///  drawing the same discriminator for the same sequence remains possible with
///  ~2^-32 probability per pair, which is accepted.
///
/// The ordering is a plain byte-wise total order so view ids can serve as
///  deterministic container keys; it carries no 'newer than' semantics.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ViewId {
    discriminator: u32,
    sequence: u32,
}

impl ViewId {
    pub const SERIALIZED_SIZE: usize = 2 * size_of::<u32>();

    /// a fresh view id for a view proposed by `proposer`. The proposer does not
    ///  become part of the id, uniqueness rests on the discriminator alone.
    pub fn new(proposer: NodeId, sequence: u32) -> ViewId {
        Self::new_with_random::<RngViewIdRandom>(proposer, sequence)
    }

    pub fn new_with_random<R: ViewIdRandom>(proposer: NodeId, sequence: u32) -> ViewId {
        let discriminator = R::next_u32();
        debug!("{:?} proposes view {:08x}/{}", proposer, discriminator, sequence);
        ViewId {
            discriminator,
            sequence,
        }
    }

    /// reassemble a view id from its two raw components, e.g. when echoing a
    ///  proposed view back in an install message
    pub fn from_parts(discriminator: u32, sequence: u32) -> ViewId {
        ViewId {
            discriminator,
            sequence,
        }
    }

    pub fn discriminator(&self) -> u32 {
        self.discriminator
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.discriminator);
        buf.put_u32(self.sequence);
    }

    pub fn try_deser(buf: &mut impl Buf) -> Result<ViewId, DecodeError> {
        let discriminator = buf.try_get_u32()?;
        let sequence = buf.try_get_u32()?;
        Ok(ViewId {
            discriminator,
            sequence,
        })
    }
}

impl Debug for ViewId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{:08x}/{}", self.discriminator, self.sequence)
    }
}
