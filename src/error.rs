use sled::transaction::TransactionError;

/// A client-correctable problem with one input field.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("validation failed on {0}")]
    Validation(#[from] ValidationError),
    // Absent records and records outside the caller's scope share this variant.
    #[error("Not found.")]
    NotFound,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("Authentication credentials were not provided.")]
    Unauthenticated,
    #[error("{entity} {id} is still referenced by {references} collected item(s)")]
    ReferentialIntegrity {
        entity: &'static str,
        id: u64,
        references: usize,
    },
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("stored record could not be decoded: {0}")]
    Encoding(String),
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl LedgerError {
    /// True for errors caused by the caller's input or identity rather than the system.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Storage(_) | LedgerError::Encoding(_))
    }
}

impl From<TransactionError<LedgerError>> for LedgerError {
    fn from(value: TransactionError<LedgerError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => LedgerError::Storage(err),
        }
    }
}

impl From<minicbor::decode::Error> for LedgerError {
    fn from(value: minicbor::decode::Error) -> Self {
        LedgerError::Encoding(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for LedgerError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        LedgerError::Encoding(value.to_string())
    }
}
