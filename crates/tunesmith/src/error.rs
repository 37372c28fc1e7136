//! Error types for the composition pipeline.
//!
//! Most failures here are recoverable: a bad parameter reply falls back to
//! defaults and a bad part is dropped. Only [`ComposeError`] ends a run.

use std::path::PathBuf;

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Failure talking to the chat-completion backend.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured; set OPENAI_API_KEY or llm.api_key")]
    MissingApiKey,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat completion failed: {0}")]
    Api(#[from] OpenAIError),

    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Why a single instrument part was dropped.
#[derive(Debug, Error)]
pub enum PartError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("reply is prose, not ABC notation")]
    Prose,

    #[error("no bar lines left after cleaning the notation")]
    NoMusic,

    #[error("notation produced no notes or rests")]
    NoNotes,
}

/// Failure of a whole song.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("no valid parts were generated")]
    NoValidParts,
}

/// Failure writing a finished song.
#[derive(Debug, Error)]
pub enum SongError {
    #[error(transparent)]
    Midi(#[from] abc::MidiError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
