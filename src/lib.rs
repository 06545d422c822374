//! chatweb is a streaming terminal client for chatgpt-web style chat proxies.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`http`] sends requests, streams bodies as cumulative text snapshots,
//!   honours cancellation, and turns the terminal JSON record into a result.
//! - [`auth`] holds the bearer token, in memory or in the system keyring.
//! - [`api`] defines the proxy payloads and one builder per endpoint.
//! - [`core`] owns configuration, conversation history, and the exchange
//!   orchestration that writes streamed replies into history.
//! - [`cli`] parses arguments and runs the one-shot and interactive commands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod http;
pub mod utils;
