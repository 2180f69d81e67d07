pub mod config;
pub mod sync;

pub use config::ChatClientConfig;
pub use sync::{MessageStore, PostStreamSync};
