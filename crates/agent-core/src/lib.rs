//! # agent-core
//!
//! Core agent logic: provider-agnostic LLM abstraction, the tool system the
//! MCP tools plug into, and the per-browser-session store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │    Tools    │  │   LlmProvider       │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionStore: SessionId -> { endpoint, model, history }     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentConfig};
pub use session::{Exchange, NewSession, Session, SessionId, SessionStore};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
