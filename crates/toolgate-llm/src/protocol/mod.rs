//! Wire format types for the supported API dialects
//!
//! Each module contains pure serde structs matching the respective API's
//! JSON format. These types are only used for serialization/deserialization
//! at the boundary and are not used internally.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod text;
pub mod tools;
