use parking::database::DatabaseError;

pub mod spot;

pub(crate) fn convert_error(why: sqlx::Error) -> DatabaseError {
    match why {
        sqlx::Error::RowNotFound => DatabaseError::NotFound,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => DatabaseError::Unavailable(Box::new(why)),
        _ => DatabaseError::Other(Box::new(why)),
    }
}
