pub mod data_stream;

pub use data_stream::{handle_data_stream, pump_data_stream, StreamReadOptions};
