use std::{error::Error, fmt};

use model::spot::ValidationError;

pub mod client;
pub mod database;
pub mod fanout;
pub mod memory;
pub mod server;

#[derive(Debug)]
pub enum RequestError {
    InvalidArgument(String),
    Unauthorized,
    NotFound,
    StorageUnavailable(Box<dyn Error + Send + Sync>),
    Other(Box<dyn Error + Send + Sync>),
}

impl RequestError {
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
            Self::Unauthorized => write!(f, "not authorized"),
            Self::NotFound => write!(f, "not found"),
            Self::StorageUnavailable(why) => write!(f, "storage unavailable: {}", why),
            Self::Other(why) => write!(f, "{}", why),
        }
    }
}

impl Error for RequestError {}

impl From<database::DatabaseError> for RequestError {
    fn from(value: database::DatabaseError) -> Self {
        match value {
            database::DatabaseError::NotFound => Self::NotFound,
            database::DatabaseError::Unauthorized => Self::Unauthorized,
            database::DatabaseError::Unavailable(why) => Self::StorageUnavailable(why),
            database::DatabaseError::Other(why) => Self::Other(why),
        }
    }
}

impl From<ValidationError> for RequestError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

pub type RequestResult<O> = Result<O, RequestError>;

pub fn not_found_to_none<O>(result: RequestResult<O>) -> RequestResult<Option<O>> {
    if let Err(RequestError::NotFound) = result {
        Ok(None)
    } else {
        result.map(Some)
    }
}
