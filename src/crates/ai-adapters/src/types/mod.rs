pub mod data_stream;
pub mod legacy;
pub mod unified;
