//! Sonor Core - real-time multi-voice synthesis engine
//!
//! The engine renders registered voices inside a fixed-period audio callback
//! while an independent control thread retunes them through atomic parameters
//! and a lock-free command ring. No locks, blocking I/O, or allocation on the
//! render path.

pub mod audio;
pub mod config;
pub mod engine;
pub mod music;
pub mod types;

pub use types::*;
