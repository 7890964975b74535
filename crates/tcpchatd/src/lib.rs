//! tcpchat Daemon - Client registry and broadcast relay
//!
//! This crate provides the relay engine behind `tcpchat-server`:
//! - `config` - Bind address, port validation and listen backlog
//! - `registry` - Client registry actor owning every client's write half
//! - `server` - TCP listener, event loop and per-client connection tasks
//! - `transcript` - The connect / relay / disconnect notices on stdout
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      tcpchat-server                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   ChatServer    │────▶│     RegistryActor           │    │
//! │  │ (TCP + console) │     │  (client set + broadcast)   │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ connections                 │ notices           │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ConnectionHandler│     │ Transcript (stdout)         │    │
//! │  │  (per client)   │     │ connect / >> / disconnect   │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
pub mod transcript;
