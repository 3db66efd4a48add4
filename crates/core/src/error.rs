use std::path::PathBuf;

use biblio_llm::ProviderError;
use snafu::Snafu;

use crate::prompt::{CONFIGURATION_ERROR_REPLY, FAILURE_REPLY};

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    #[snafu(display("'{name}' has unsupported media type '{media_type}'"))]
    UnsupportedFileType {
        stage: &'static str,
        name: String,
        media_type: String,
    },
    #[snafu(display("failed to read {path:?} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("'{name}' is not valid UTF-8 text: {source}"))]
    DecodeText {
        stage: &'static str,
        name: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("failed to parse PDF '{name}' on `{stage}`: {details}"))]
    Parse {
        stage: &'static str,
        name: String,
        details: String,
    },
    #[snafu(display("{capability} is not available in this build"))]
    DependencyUnavailable {
        stage: &'static str,
        capability: &'static str,
    },
    #[snafu(display("ingestion worker for '{name}' stopped unexpectedly: {details}"))]
    Worker {
        stage: &'static str,
        name: String,
        details: String,
    },
}

/// Coarse failure classes shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestErrorKind {
    UnsupportedFileType,
    ReadError,
    ParseError,
    DependencyUnavailable,
}

impl IngestError {
    pub fn kind(&self) -> IngestErrorKind {
        match self {
            Self::UnsupportedFileType { .. } => IngestErrorKind::UnsupportedFileType,
            Self::ReadFile { .. } | Self::DecodeText { .. } => IngestErrorKind::ReadError,
            // A worker only dies while interpreting a page.
            Self::Parse { .. } | Self::Worker { .. } => IngestErrorKind::ParseError,
            Self::DependencyUnavailable { .. } => IngestErrorKind::DependencyUnavailable,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            IngestErrorKind::UnsupportedFileType => "Please upload a valid .txt or .pdf file.",
            IngestErrorKind::ReadError => "Failed to read the file.",
            IngestErrorKind::ParseError => {
                "Could not read the PDF file. It might be corrupted or protected."
            }
            IngestErrorKind::DependencyUnavailable => {
                "PDF support is not available in this build. Please upload a .txt file."
            }
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("chat could not be opened on `{stage}`: {source}"))]
    Configuration {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("request failed on `{stage}`: {details}"))]
    Request {
        stage: &'static str,
        details: String,
    },
}

impl ChatError {
    /// Transcript text for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { source, .. } => {
                format!("{CONFIGURATION_ERROR_REPLY} ({source})")
            }
            Self::Request { .. } => FAILURE_REPLY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_ingest_failure_has_a_user_message() {
        let errors = [
            IngestError::UnsupportedFileType {
                stage: "test",
                name: "cover.png".to_string(),
                media_type: "image/png".to_string(),
            },
            IngestError::Parse {
                stage: "test",
                name: "book.pdf".to_string(),
                details: "encrypted".to_string(),
            },
            IngestError::DependencyUnavailable {
                stage: "test",
                capability: "PDF parsing",
            },
        ];

        let kinds = errors.iter().map(IngestError::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                IngestErrorKind::UnsupportedFileType,
                IngestErrorKind::ParseError,
                IngestErrorKind::DependencyUnavailable,
            ]
        );
        assert!(errors.iter().all(|error| !error.user_message().is_empty()));
    }

    #[test]
    fn configuration_errors_name_the_cause() {
        let error = ChatError::Configuration {
            stage: "test",
            source: ProviderError::MissingApiKey {
                stage: "test",
                provider_id: "gemini".to_string(),
            },
        };
        let text = error.user_message();
        assert!(text.starts_with(CONFIGURATION_ERROR_REPLY));
        assert!(text.contains("missing API key"));
    }
}
