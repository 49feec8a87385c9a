//! Audio device backend.

pub mod backend;
pub mod config;
pub mod cpal_backend;
pub mod error;

pub use backend::StreamHandle;
pub use config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
pub use error::{AudioError, AudioResult};
