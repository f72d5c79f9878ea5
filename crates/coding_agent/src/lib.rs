//! Headless coding agent driver with glass-box session logging.
//!
//! ## Configuration
//!
//! Startup settings come from the environment; blank values fall back to the
//! defaults and command-line flags override them:
//!
//! - `CODING_AGENT_PROVIDER`: model provider id. Only `mock` (a deterministic
//!   scripted provider) is available.
//! - `CODING_AGENT_MODEL`: model name recorded in every logged request.
//! - `CODING_AGENT_SYSTEM_INSTRUCTIONS`: system prompt for new conversations.
//! - `CODING_AGENT_LOG_DIR`: base directory holding `.last_session` and the
//!   numbered `session_NNN/` directories.
//! - `CODING_AGENT_SHELL_TIMEOUT_SEC`: optional timeout (> 0) for shell commands.
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.
//!
//! ## Logging contract
//!
//! The runtime owns the model-facing message history and hands the full
//! history to `session_store` after every turn. Each user prompt, model call
//! and shell call becomes a numbered interaction under the session directory.

pub mod commands;
pub mod config;
pub mod providers;
pub mod runtime;
pub mod tools;
