//! Replate - a small report-template server with token-gated sharing
//!
//! Authenticated users manage and render report templates; sharing tokens
//! let them expose a single template to non-authenticated callers, either
//! read-only (render as stored) or read+write (render with custom data).

pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod render;
pub mod server;
pub mod sharing;

pub use models::{Engine, Recipe, Template};
pub use sharing::{AccessKind, SharingError, SharingExtension};
