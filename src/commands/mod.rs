//! Command Layer
//!
//! The dispatcher between the wire and the store:
//!
//! ```text
//! Client request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP decoder   │  (protocol module)
//! └────────┬────────┘
//!          │ Frame::Array of arguments
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │ name dispatch,  │
//! │ arity + parsing,│
//! │ reply building  │
//! └────────┬────────┘
//!          │ typed calls
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
