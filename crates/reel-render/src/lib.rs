//! External renderer invocation.
//!
//! This crate provides:
//! - The `Renderer` interface and a command-line implementation
//! - Timeout enforcement and combined output capture
//! - Moderation-block detection with failed beat indices
//! - Output resolution with copy-then-remove canonicalisation
//! - FFprobe metadata for rendered videos

pub mod command;
pub mod config;
pub mod error;
pub mod moderation;
pub mod output;
pub mod probe;
pub mod renderer;

pub use config::RendererConfig;
pub use error::{RenderError, RenderResult};
pub use probe::probe_video;
pub use renderer::{CliRenderer, RenderMode, RenderOutcome, RenderRequest, Renderer};
