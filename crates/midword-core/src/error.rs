use thiserror::Error;

/// User-caused rejection of a guess attempt. Surfaced verbatim, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuessRejection {
    #[error("You must be signed in to guess")]
    NotAuthenticated,

    #[error("Round is not active")]
    RoundNotActive,

    #[error("You already guessed '{0}'")]
    DuplicateTitle(String),

    #[error("You already found match #{}", .0 + 1)]
    DuplicateRank(usize),

    #[error("Max attempts reached")]
    MaxAttemptsReached,

    #[error("All matches already guessed")]
    AllMatchesFound,

    #[error("Guesses already submitted")]
    AlreadySubmitted,

    #[error("Guess '{0}' overlaps a target word")]
    OverlapsTarget(String),

    #[error("Guess is empty")]
    EmptyGuess,
}

#[derive(Error, Debug)]
pub enum MidwordError {
    #[error("Rejected: {0}")]
    Rejected(#[from] GuessRejection),

    /// A referenced entity is missing. Indicates an upstream consistency bug.
    #[error("Integrity Error: {0}")]
    Integrity(String),

    /// Collaborator failure (embedding service, vector index, timeout).
    #[error("Transient Error: {0}")]
    Transient(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MidwordError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MidwordError::Transient(_))
    }
}

pub type MwResult<T> = Result<T, MidwordError>;
