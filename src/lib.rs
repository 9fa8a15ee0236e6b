pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod docker;
pub mod error;
pub mod health;
pub mod identity;
pub mod manifest;
pub mod orchestrator;
pub mod router;
pub mod session;
pub mod storage;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PreviewError, Result};
pub use identity::PreviewKey;
pub use orchestrator::{PreviewHandle, PreviewOrchestrator, PreviewRequest, PreviewStatus, SessionPreview};
