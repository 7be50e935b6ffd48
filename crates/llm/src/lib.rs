//! `stepwise-llm` — the LLM port and its adapters.
//!
//! [`traits::LlmPort`] is the stable contract the agent loop calls against.
//! [`openai_compat::OpenAiCompatProvider`] is the one reference adapter that
//! ships (OpenAI and Azure OpenAI share a wire format). [`scripted`] provides
//! a deterministic stand-in for exercising the agent loop in tests.

pub mod auth;
pub mod openai_compat;
pub mod scripted;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

pub use auth::AuthRotator;
pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, ScriptedResponse};
pub use traits::{LlmPort, LlmRequest};
