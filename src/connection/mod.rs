//! Connection Module
//!
//! Accepted sockets land here: each client gets its own async task
//! running the read-decode-execute-reply loop in
//! [`handler::ConnectionHandler`]. Thousands of idle clients cost only
//! their buffers; Tokio multiplexes the tasks over the runtime threads.
//!
//! ```text
//! TCP listener (main.rs)
//!        │ accept()
//!        ▼
//!   spawn per client
//!        │
//!        ▼
//! ┌───────────────────────────────────────────────┐
//! │ ConnectionHandler                             │
//! │ read bytes -> decode frame -> execute -> send │
//! └───────────────────────────────────────────────┘
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
