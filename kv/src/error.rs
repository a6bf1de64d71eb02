use std::fmt;

/// Result alias used pervasively across the crate.
pub type CResult<T> = std::result::Result<T, Error>;

/// The error taxonomy for the whole kv-rs core: lock manager, transactor,
/// storage engine and log codec all funnel their failures through this
/// enum so callers at the protocol layer can match on a stable set of
/// kinds rather than opaque strings.
#[derive(Debug)]
pub enum Error {
    /// `Get` on an absent key.
    NotFound,

    /// A malformed command, or a malformed log frame.
    Parse(String),

    /// The serializable store was invoked without an ambient transaction id.
    NoTransaction,

    /// BEGIN within a transaction, or COMMIT/ROLLBACK without one.
    TxState(String),

    /// A lock wait was interrupted by cancellation.
    Cancelled,

    /// Failure to read or write the log/engine on disk.
    Io(std::io::Error),

    /// A log frame could not be decoded during replay.
    Codec(String),

    /// Catch-all for invariant violations and wrapped library errors.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "not found"),
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::NoTransaction => write!(f, "no active transaction"),
            Error::TxState(msg) => write!(f, "{}", msg),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Codec(msg) => write!(f, "codec error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("poisoned lock: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        let errs = vec![
            Error::NotFound,
            Error::Parse("bad".into()),
            Error::NoTransaction,
            Error::TxState("cannot begin transaction within an active transaction".into()),
            Error::Cancelled,
            Error::Codec("unknown kind".into()),
            Error::Internal("oops".into()),
        ];
        for e in errs {
            assert!(!e.to_string().is_empty());
        }
    }
}
