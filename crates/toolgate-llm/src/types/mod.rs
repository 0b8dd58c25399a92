//! Internal canonical types for request/response representation
//!
//! These types are dialect-agnostic and serve as the normalized internal
//! representation that all wire formats convert to and from.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall, generate_call_id};
pub use request::{CompletionParams, CompletionRequest};
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{StreamDelta, StreamEvent, StreamToolCall};
pub use tool::{
    AUTO_MARKER, FunctionDefinition, ParameterSchema, PropertySchema, SchemaType, ToolChoice, ToolDefinition,
    ToolDialect,
};
