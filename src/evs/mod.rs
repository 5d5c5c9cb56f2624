pub mod error;
pub mod gap;
pub mod messages;
pub mod node_id;
pub mod seqno;
pub mod view_id;
pub mod wire;
