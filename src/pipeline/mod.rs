//! Multi-model arbitration pipeline
//!
//! normalize → candidate fan-out → judge prompt → judge call → tag extraction
//! → chunked streaming.

pub mod arbiter;
pub mod conversation;
pub mod extractor;
pub mod judge;
pub mod pool;
pub mod streamer;

pub use arbiter::Arbiter;
pub use conversation::{
    ContentBlock, Conversation, ConversationTurn, RawContent, RawTurn, Role, normalize,
};
pub use extractor::{CandidateWeight, Decision, JudgeVerdict, TagExtractor};
pub use judge::{JudgeInvoker, build_judge_conversation, build_judge_directive};
pub use pool::{CandidateAnswer, CandidatePool};
pub use streamer::{ChunkGranularity, chunk_stream, chunk_text};
