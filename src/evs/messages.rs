use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::evs::error::ConstructionError;
use crate::evs::gap::Gap;
use crate::evs::node_id::NodeId;
use crate::evs::seqno::{SeqNo, SeqRange};
use crate::evs::view_id::ViewId;

/// Requested delivery guarantee of a user message, ordered from weakest to
///  strongest. The ordering is load-bearing: delivery decisions compare the
///  weakest level observed across a view, so `Ord` must follow the declared
///  order.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum SafetyPrefix {
    /// placeholder carrying no delivery obligation at all
    Drop = 0,
    /// best effort, no retransmission
    Unreliable = 1,
    /// ordered per sender only
    Fifo = 2,
    /// total order agreed among the view members before delivery
    Agreed = 3,
    /// agreed, and all view members have acknowledged receipt before the
    ///  sender's application observes delivery
    Safe = 4,
}

bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MessageFlags: u8 {
        /// the application payload continues in a follow-up message
        const MSG_MORE = 0x01;
    }
}

/// The messages exchanged between group members. Each variant carries exactly
///  the fields that are meaningful for it - in particular, the membership
///  collections exist only on join / install messages, so there is no way to
///  even ask a user message for them.
///
/// Messages are plain values: immutable once assembled, cheap to compare, and
///  fully structurally equal per variant. Mutation during assembly is limited
///  to the membership collections of a not-yet-sent join / install message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EvsMessage {
    /// application data delivery
    User(UserData),
    /// relays a message on behalf of another member, preserving the true origin
    Delegate(DelegateData),
    /// reports a missing or redundant range of sequence numbers for one source
    Gap(GapData),
    /// proposes a view: the membership and per-member delivered ranges as the
    ///  proposer sees them
    Join(MembershipData),
    /// announces voluntary departure from a view
    Leave(LeaveData),
    /// finalizes a previously proposed view as the active one
    Install(MembershipData),
}

impl EvsMessage {
    pub fn safety_prefix(&self) -> Option<SafetyPrefix> {
        match self {
            EvsMessage::User(data) => Some(data.safety_prefix),
            _ => None,
        }
    }

    /// the sequence number a variant orders by: the starting sequence number
    ///  for user messages, the reference sequence number for gap messages, and
    ///  the safe sequence number for join / install proposals
    pub fn seq(&self) -> Option<SeqNo> {
        match self {
            EvsMessage::User(data) => Some(data.seq),
            EvsMessage::Gap(data) => Some(data.seq),
            EvsMessage::Join(data) | EvsMessage::Install(data) => Some(data.safe_seq),
            _ => None,
        }
    }

    pub fn seq_range(&self) -> Option<u8> {
        match self {
            EvsMessage::User(data) => Some(data.seq_range),
            _ => None,
        }
    }

    pub fn aru_seq(&self) -> Option<SeqNo> {
        match self {
            EvsMessage::User(data) => Some(data.aru_seq),
            EvsMessage::Join(data) | EvsMessage::Install(data) => Some(data.aru_seq),
            _ => None,
        }
    }

    pub fn flags(&self) -> Option<MessageFlags> {
        match self {
            EvsMessage::User(data) => Some(data.flags),
            _ => None,
        }
    }

    pub fn source_view(&self) -> Option<ViewId> {
        match self {
            EvsMessage::User(data) => Some(data.source_view),
            EvsMessage::Join(data) | EvsMessage::Install(data) => Some(data.source_view),
            EvsMessage::Leave(data) => Some(data.source_view),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<NodeId> {
        match self {
            EvsMessage::Delegate(data) => Some(data.source),
            _ => None,
        }
    }

    pub fn gap(&self) -> Option<&Gap> {
        match self {
            EvsMessage::Gap(data) => Some(&data.gap),
            _ => None,
        }
    }

    pub fn membership(&self) -> Option<&MembershipData> {
        match self {
            EvsMessage::Join(data) | EvsMessage::Install(data) => Some(data),
            _ => None,
        }
    }

    pub fn membership_mut(&mut self) -> Option<&mut MembershipData> {
        match self {
            EvsMessage::Join(data) | EvsMessage::Install(data) => Some(data),
            _ => None,
        }
    }
}


#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct UserData {
    pub safety_prefix: SafetyPrefix,
    pub seq: SeqNo,
    /// count of additional sequence numbers covered beyond `seq`
    pub seq_range: u8,
    /// all-received-up-to marker: everything up to and including this sequence
    ///  number has been received by the sender
    pub aru_seq: SeqNo,
    pub flags: MessageFlags,
    /// the view this message was sent in
    pub source_view: ViewId,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DelegateData {
    /// the member the relayed message originates from
    pub source: NodeId,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GapData {
    pub seq: SeqNo,
    pub gap: Gap,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LeaveData {
    pub source_view: ViewId,
}

/// Shared payload of join and install messages: the proposed view, the
///  proposer's delivery watermarks, and the three membership collections. The
///  collections are allocated eagerly - an empty proposal is still a valid
///  proposal - and owned by the message until it is dropped.
///
/// A member may appear at most once per collection; re-adding is a contract
///  violation rather than an overwrite, so callers that want idempotent adds
///  have to check first.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MembershipData {
    pub source_view: ViewId,
    pub aru_seq: SeqNo,
    /// everything up to and including this sequence number is known to have
    ///  reached all members of the proposer's current view
    pub safe_seq: SeqNo,
    operational: BTreeMap<NodeId, SeqRange>,
    untrusted: BTreeSet<NodeId>,
    unoperational: BTreeSet<NodeId>,
}

impl MembershipData {
    pub fn new(source_view: ViewId, aru_seq: SeqNo, safe_seq: SeqNo) -> MembershipData {
        MembershipData {
            source_view,
            aru_seq,
            safe_seq,
            operational: BTreeMap::new(),
            untrusted: BTreeSet::new(),
            unoperational: BTreeSet::new(),
        }
    }

    pub fn add_operational(&mut self, node: NodeId, range: SeqRange) -> Result<(), ConstructionError> {
        match self.operational.entry(node) {
            Entry::Occupied(_) => Err(ConstructionError::DuplicateMember(node)),
            Entry::Vacant(e) => {
                e.insert(range);
                Ok(())
            }
        }
    }

    pub fn add_untrusted(&mut self, node: NodeId) -> Result<(), ConstructionError> {
        if self.untrusted.insert(node) {
            Ok(())
        }
        else {
            Err(ConstructionError::DuplicateMember(node))
        }
    }

    pub fn add_unoperational(&mut self, node: NodeId) -> Result<(), ConstructionError> {
        if self.unoperational.insert(node) {
            Ok(())
        }
        else {
            Err(ConstructionError::DuplicateMember(node))
        }
    }

    pub fn operational(&self) -> &BTreeMap<NodeId, SeqRange> {
        &self.operational
    }

    pub fn untrusted(&self) -> &BTreeSet<NodeId> {
        &self.untrusted
    }

    pub fn unoperational(&self) -> &BTreeSet<NodeId> {
        &self.unoperational
    }
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_safety_prefix_ordering() {
        use SafetyPrefix::*;

        let ordered = [Drop, Unreliable, Fifo, Agreed, Safe];
        for (i, weaker) in ordered.iter().enumerate() {
            for stronger in &ordered[i + 1..] {
                assert!(weaker < stronger);
            }
        }

        // transitivity along the chain
        assert!(Drop < Fifo && Fifo < Safe && Drop < Safe);

        assert_eq!(ordered.iter().max(), Some(&Safe));
        assert_eq!(ordered.iter().min(), Some(&Drop));
    }

    #[rstest]
    #[case::drop(0, Some(SafetyPrefix::Drop))]
    #[case::unreliable(1, Some(SafetyPrefix::Unreliable))]
    #[case::fifo(2, Some(SafetyPrefix::Fifo))]
    #[case::agreed(3, Some(SafetyPrefix::Agreed))]
    #[case::safe(4, Some(SafetyPrefix::Safe))]
    #[case::out_of_range(5, None)]
    fn test_safety_prefix_from_primitive(#[case] raw: u8, #[case] expected: Option<SafetyPrefix>) {
        assert_eq!(SafetyPrefix::try_from_primitive(raw).ok(), expected);
    }

    #[test]
    fn test_add_operational_duplicate() {
        let mut membership = MembershipData::new(ViewId::from_parts(1, 1), SeqNo(5), SeqNo(3));
        let first_range = SeqRange::new(SeqNo(0), SeqNo(7));

        membership.add_operational(NodeId(1), first_range).unwrap();
        assert_eq!(
            membership.add_operational(NodeId(1), SeqRange::new(SeqNo(1), SeqNo(2))),
            Err(ConstructionError::DuplicateMember(NodeId(1)))
        );

        // the first entry stays untouched
        assert_eq!(membership.operational().get(&NodeId(1)), Some(&first_range));
        assert_eq!(membership.operational().len(), 1);
    }

    #[test]
    fn test_add_untrusted_duplicate() {
        let mut membership = MembershipData::new(ViewId::from_parts(1, 1), SeqNo(5), SeqNo(3));

        membership.add_untrusted(NodeId(2)).unwrap();
        assert_eq!(membership.add_untrusted(NodeId(2)), Err(ConstructionError::DuplicateMember(NodeId(2))));
        assert_eq!(membership.untrusted().len(), 1);
    }

    #[test]
    fn test_add_unoperational_duplicate() {
        let mut membership = MembershipData::new(ViewId::from_parts(1, 1), SeqNo(5), SeqNo(3));

        membership.add_unoperational(NodeId(3)).unwrap();
        assert_eq!(membership.add_unoperational(NodeId(3)), Err(ConstructionError::DuplicateMember(NodeId(3))));
        assert_eq!(membership.unoperational().len(), 1);

        // the same node in a *different* collection is not a duplicate
        membership.add_untrusted(NodeId(3)).unwrap();
    }

    #[test]
    fn test_new_membership_collections_empty() {
        let membership = MembershipData::new(ViewId::from_parts(1, 1), SeqNo::UNKNOWN, SeqNo::UNKNOWN);

        assert!(membership.operational().is_empty());
        assert!(membership.untrusted().is_empty());
        assert!(membership.unoperational().is_empty());
    }

    fn user_message() -> EvsMessage {
        EvsMessage::User(UserData {
            safety_prefix: SafetyPrefix::Safe,
            seq: SeqNo(42),
            seq_range: 3,
            aru_seq: SeqNo(40),
            flags: MessageFlags::MSG_MORE,
            source_view: ViewId::from_parts(0xd, 7),
        })
    }

    fn join_message() -> EvsMessage {
        EvsMessage::Join(MembershipData::new(ViewId::from_parts(2, 8), SeqNo(11), SeqNo(9)))
    }

    #[test]
    fn test_accessors_user() {
        let msg = user_message();

        assert_eq!(msg.safety_prefix(), Some(SafetyPrefix::Safe));
        assert_eq!(msg.seq(), Some(SeqNo(42)));
        assert_eq!(msg.seq_range(), Some(3));
        assert_eq!(msg.aru_seq(), Some(SeqNo(40)));
        assert_eq!(msg.flags(), Some(MessageFlags::MSG_MORE));
        assert_eq!(msg.source_view(), Some(ViewId::from_parts(0xd, 7)));

        assert_eq!(msg.source(), None);
        assert_eq!(msg.gap(), None);
        assert!(msg.membership().is_none());
    }

    #[test]
    fn test_accessors_join() {
        let msg = join_message();

        assert_eq!(msg.source_view(), Some(ViewId::from_parts(2, 8)));
        assert_eq!(msg.aru_seq(), Some(SeqNo(11)));
        assert_eq!(msg.seq(), Some(SeqNo(9)));
        assert!(msg.membership().is_some());

        assert_eq!(msg.safety_prefix(), None);
        assert_eq!(msg.flags(), None);
        assert_eq!(msg.source(), None);
        assert_eq!(msg.gap(), None);
    }

    #[test]
    fn test_accessors_other_variants() {
        let delegate = EvsMessage::Delegate(DelegateData { source: NodeId(77) });
        assert_eq!(delegate.source(), Some(NodeId(77)));
        assert_eq!(delegate.seq(), None);
        assert_eq!(delegate.source_view(), None);
        assert!(delegate.membership().is_none());

        let gap = EvsMessage::Gap(GapData {
            seq: SeqNo(5),
            gap: Gap::new(NodeId(1), SeqRange::new(SeqNo(10), SeqNo(20))),
        });
        assert_eq!(gap.seq(), Some(SeqNo(5)));
        assert_eq!(gap.gap().unwrap().range, SeqRange::new(SeqNo(10), SeqNo(20)));
        assert!(gap.membership().is_none());

        let leave = EvsMessage::Leave(LeaveData { source_view: ViewId::from_parts(3, 4) });
        assert_eq!(leave.source_view(), Some(ViewId::from_parts(3, 4)));
        assert_eq!(leave.seq(), None);
        assert!(leave.membership().is_none());
    }

    #[test]
    fn test_membership_mut_assembly() {
        let mut msg = join_message();

        msg.membership_mut().unwrap().add_operational(NodeId(1), SeqRange::new(SeqNo(0), SeqNo(5))).unwrap();
        msg.membership_mut().unwrap().add_untrusted(NodeId(2)).unwrap();

        let membership = msg.membership().unwrap();
        assert_eq!(membership.operational().len(), 1);
        assert_eq!(membership.untrusted().len(), 1);

        assert!(EvsMessage::Leave(LeaveData { source_view: ViewId::from_parts(1, 1) }).membership_mut().is_none());
    }

    #[test]
    fn test_structural_equality_per_variant() {
        assert_eq!(user_message(), user_message());
        assert_eq!(join_message(), join_message());

        let mut with_member = join_message();
        with_member.membership_mut().unwrap().add_untrusted(NodeId(1)).unwrap();
        assert_ne!(join_message(), with_member);

        // join and install with identical payload are still different messages
        let payload = MembershipData::new(ViewId::from_parts(2, 8), SeqNo(11), SeqNo(9));
        assert_ne!(EvsMessage::Join(payload.clone()), EvsMessage::Install(payload));
    }

    #[test]
    fn test_flags_roundtrip_bits() {
        let flags = MessageFlags::from_bits_retain(0x81);
        assert!(flags.contains(MessageFlags::MSG_MORE));
        assert_eq!(flags.bits(), 0x81);
    }
}
