use warp::http::status::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, independent of the message.
/// The HTTP layer maps each kind to a status code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request failed boundary validation (bad JSON, bad identifier, reserved name...)
    InvalidRequest,
    DuplicateTable,
    NotFound,
    /// The backend rejected a DDL statement. The message carries its diagnostic.
    SchemaMutationFailed,
    /// A mutation reported success but its result is not visible via introspection.
    IntegrityViolation,
    UnsupportedAlteration,
    BackendUnavailable,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest
            | ErrorKind::DuplicateTable
            | ErrorKind::SchemaMutationFailed
            | ErrorKind::UnsupportedAlteration => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::IntegrityViolation => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub msg: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: String) -> Error {
        Error { kind, msg }
    }

    pub fn code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let code = self.code();
        let canon = code.canonical_reason().unwrap_or("");
        write!(
            f,
            "Error {} {} ({:?}), {}",
            code.as_str(),
            canon,
            self.kind,
            self.msg
        )
    }
}

impl std::error::Error for Error {}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Error {
        let msg = format!("Database rusqlite error {}", err);
        Error {
            kind: ErrorKind::BackendUnavailable,
            msg,
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Error {
        let msg = format!("Failed to obtain a database connection from the pool, {}", err);
        Error {
            kind: ErrorKind::BackendUnavailable,
            msg,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        let msg = format!("JSON formatting error {}", err);
        Error {
            kind: ErrorKind::InvalidRequest,
            msg,
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for Error {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Error {
        let msg = format!("JSON deserialization error {}", err);
        Error {
            kind: ErrorKind::InvalidRequest,
            msg,
        }
    }
}

pub trait ErrorContext<T> {
    fn context<F>(self, context_add: F) -> Result<T>
    where
        F: FnOnce() -> String;
    fn context_str(self, context_add: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context<F>(self, context_add: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        match self {
            Ok(t) => Ok(t),
            Err(err) => {
                let err: Error = err.into();
                let kind = err.kind;
                let mut msg = err.msg;
                msg.push_str(", ");
                msg.push_str(&context_add());
                Err(Error { kind, msg })
            }
        }
    }
    fn context_str(self, context_add: &str) -> Result<T> {
        match self {
            Ok(t) => Ok(t),
            Err(err) => {
                let err: Error = err.into();
                let kind = err.kind;
                let mut msg = err.msg;
                msg.push_str(", ");
                msg.push_str(context_add);
                Err(Error { kind, msg })
            }
        }
    }
}
