//! Error types for document builds and article lookup.

use std::fmt;

use thiserror::Error;

use crate::model::{Article, SourceId};

/// Why an annotation was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformation {
    StartAfterEnd,
    EndOutOfBounds,
    NotCharBoundary,
    TablePayload(String),
}

impl fmt::Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformation::StartAfterEnd => write!(f, "start is after end"),
            Malformation::EndOutOfBounds => write!(f, "end is past the end of the text"),
            Malformation::NotCharBoundary => write!(f, "offset splits a UTF-8 character"),
            Malformation::TablePayload(detail) => write!(f, "invalid table payload: {detail}"),
        }
    }
}

/// An annotation whose range or payload cannot be rendered faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed annotation `{name}` [{start}, {end}) over text of {text_len} bytes: {reason}")]
pub struct MalformedAnnotationError {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub text_len: usize,
    pub reason: Malformation,
}

/// Errors that end a single document build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error(transparent)]
    MalformedAnnotation(#[from] MalformedAnnotationError),

    #[error("tables nested deeper than {limit} levels")]
    TableTooDeep { limit: usize },

    /// The build panicked on a render worker; the worker survived.
    #[error("render panicked: {message}")]
    Panicked { message: String },
}

/// Errors raised by article sources.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no article titled {word:?} in {dictionary}")]
    NotFound { dictionary: SourceId, word: String },

    /// The article exists but points at a title the dictionary lacks.
    #[error("redirect from {:?} to {redirect:?} not found", .article.title)]
    RedirectNotFound { article: Box<Article>, redirect: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid dictionary file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while starting the render workers.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to start render workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, BuildError>;
