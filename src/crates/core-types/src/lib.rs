//! Chatloom shared DTOs
//!
//! Plain data types shared by the stream adapters, the chat core and the
//! frontends. Nothing in here performs I/O.

pub mod artifact;
pub mod message;
pub mod tool;

pub use artifact::*;
pub use message::*;
pub use tool::*;
