pub mod config;
pub mod constants;
pub mod device_manager;
pub mod error;
pub mod mix_buffer;
pub mod mixer;
pub mod reader;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;
