//! Tool-calling emulation for text-only backends
//!
//! Tool definitions are validated and compiled into a plain-text prompt.
//! The backend's free-form answer is parsed back into structured calls,
//! missing parameters are inferred from the conversation, and every
//! backend protocol is normalized into one response envelope.

pub mod cache;
pub mod conversation;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod resolver;
pub mod template;
pub mod validator;

pub use conversation::{ConversationState, ConversationStore, ConversationSummary};
pub use normalizer::{NormalizationResult, NormalizeOptions, ResponseNormalizer};
pub use pipeline::{Completion, EmulationEngine};
pub use validator::validate_tools;
