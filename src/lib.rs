//! ffdeck - ffmpeg command construction and supervision
//!
//! Typed per-operation options are turned into ffmpeg argument lists,
//! executed as supervised child processes with live progress, applied in
//! batches, and complemented by ffprobe-based media inspection.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod workflow;
