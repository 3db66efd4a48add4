#![deny(unsafe_code)]

/// Window shell routing between the upload and chat panes.
pub mod app;
pub mod chat;
/// Layered settings and provider construction.
pub mod settings;
pub mod upload;
