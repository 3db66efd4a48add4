#![deny(unsafe_code)]

//! Document ingestion and document-scoped chat sessions.
//!
//! The flow is: [`ingest`] turns a [`SourceFile`] into a [`Document`], then
//! [`Session::open`] pairs that document with a provider handle and owns the transcript
//! until the session is dropped.

pub mod document;
pub mod error;
pub mod ingest;
pub mod message;
pub mod prompt;
pub mod session;

pub use document::{Document, DocumentKind};
pub use error::{ChatError, IngestError, IngestErrorKind, IngestResult};
pub use ingest::{IngestHandle, IngestProgress, IngestWorker, SourceFile, ingest, spawn_ingest};
pub use message::{
    Message, MessageId, MessageStatus, Role, StreamState, StreamTransition,
    StreamTransitionRejection, StreamTransitionResult,
};
pub use session::{ChatHandle, Session};
