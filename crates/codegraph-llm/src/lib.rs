//! Text completion and embedding providers.
//!
//! The indexing core treats completion as a black box ("given a prompt and
//! context, produce text") and embeddings as "given text, produce a vector".
//! Both capabilities live behind [`LlmProvider`].

pub mod any;
pub mod error;
pub mod http;
pub mod local;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;

pub use error::LlmError;
pub use provider::LlmProvider;
