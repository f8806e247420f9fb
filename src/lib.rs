//! # ouroboros
//!
//! A personal-assistant agent: chat with a local or hosted LLM, remember
//! facts in vector memory, keep a thought journal, learn reusable skills,
//! speak and listen, and optionally think and propose actions on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ouroboros::agent::OuroborosAgent;
//! use ouroboros::config::OuroborosConfig;
//!
//! # async fn run() -> ouroboros::OuroborosResult<()> {
//! let config = OuroborosConfig::load(None)?;
//! let mut agent = OuroborosAgent::initialize(config).await?;
//!
//! let reply = agent.process("remember my cat is called Miso").await;
//! println!("{}", reply.text);
//!
//! // Commands chain with `|`; `$PIPE` marks where the previous output goes
//! let reply = agent.process("recall cat | summarize $PIPE").await;
//! println!("{}", reply.text);
//!
//! agent.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | `OuroborosAgent`: subsystem start-up, command dispatch, tool-calling chat loop |
//! | [`command`] | Free-text command parser (`learn about`, `recall`, `skill`, ...) |
//! | [`pipe`] | `|` chains with `$PIPE` substitution |
//! | [`provider`] | Chat LLM abstraction (Ollama, OpenAI-compatible, DeepSeek) |
//! | [`embedding`] | Embedding backends plus an offline hashing embedder |
//! | [`memory`] | Semantic memory over Qdrant or an in-memory store, and the thought journal |
//! | [`skill`] | Markdown skill files, registry, and the skill-as-tool bridge |
//! | [`tool`] | Async tool trait, registry, and built-in tools |
//! | [`speech`] | Text-to-speech, speech-to-text, personas and voices |
//! | [`autonomy`] | Background thinking and push-mode intentions awaiting approval |
//! | [`history`] | Bounded conversation history with a JSONL transcript |
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error types with thiserror |

pub mod agent;
pub mod autonomy;
pub mod command;
pub mod config;
pub mod embedding;
pub mod error;
pub mod history;
pub mod memory;
pub mod pipe;
pub mod provider;
pub mod skill;
pub mod speech;
pub mod tool;
pub mod types;

pub use error::{OuroborosError, OuroborosResult};
pub use types::*;
