//! # QuartzKV - An In-Memory Key-Value Store with TTL and Sorted Sets
//!
//! QuartzKV is a single-node, Redis-compatible key-value server written
//! in Rust. Keys map to string or sorted-set values, may carry a
//! time-to-live, and are served to many concurrent clients over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            QuartzKV                             │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │          │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │          │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘          │
//! │                                               │                 │
//! │  ┌─────────────┐                              ▼                 │
//! │  │ RESP        │    ┌───────────────────────────────────────┐   │
//! │  │ decoder /   │    │            StorageEngine              │   │
//! │  │ encoder     │    │  ┌──────────────┐  ┌───────────────┐  │   │
//! │  └─────────────┘    │  │ Table        │  │ TtlIndex      │  │   │
//! │                     │  │ key -> entry │  │ deadline heap │  │   │
//! │                     │  └──────────────┘  └───────────────┘  │   │
//! │                     └───────────────────▲───────────────────┘   │
//! │                                         │                       │
//! │                     ┌───────────────────┴───────────────────┐   │
//! │                     │            ExpiryReaper               │   │
//! │                     │ sleeps on the earliest deadline and   │   │
//! │                     │ evicts overdue keys (background task) │   │
//! │                     └───────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use quartzkv::commands::CommandHandler;
//! use quartzkv::connection::{handle_connection, ConnectionStats};
//! use quartzkv::storage::{ExpiryReaper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Arc::new(StorageEngine::new());
//!     let _reaper = ExpiryReaper::start(Arc::clone(&engine));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let commands = CommandHandler::new(Arc::clone(&engine));
//!         tokio::spawn(handle_connection(stream, addr, commands, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - Strings and keys: `SET` (with `EX`/`NX`), `GET`, `DEL`, `EXISTS`,
//!   `EXPIRE`, `TTL`
//! - Sorted sets: `ZADD`, `ZREM`, `ZSCORE`, `ZRANGE`, `ZRANGEBYSCORE`,
//!   `ZRANK`, `ZCARD`
//! - Server: `PING`, `ECHO`, `DBSIZE`, `FLUSHDB`, `QUIT`
//!
//! ## Design Highlights
//!
//! ### One deadline, two indexes
//!
//! A key's expiry lives both on its table entry and in a min-heap over
//! `(deadline, key)`. The [`storage::StorageEngine`] facade is the only
//! writer of either, updating the table first, the heap second and
//! waking the reaper last, so the two views never drift apart.
//!
//! ### Deadline-driven eviction
//!
//! The expiry reaper does not poll. It sleeps exactly until the earliest
//! stored deadline and is woken early whenever a write moves that
//! deadline forward, so keys disappear on time without a busy loop —
//! and lazy checks on read cover any key the reaper has not reached yet.
//!
//! ### Sorted sets with two coupled views
//!
//! Each sorted set pairs a `member -> score` map (O(1) score lookups)
//! with a size-augmented AVL tree over `(score, member)` (O(log n) rank
//! and range queries). Both views always hold exactly the same pairs.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{parse_frame, Frame, ParseError};
pub use storage::{ExpiryReaper, KeyTtl, StorageEngine, StoreError};

/// The default port QuartzKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host QuartzKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of QuartzKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
