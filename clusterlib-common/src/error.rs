//! Error type shared by every clusterlib crate.
use std::num::ParseIntError;

/// The kinds of error a clusterlib call can surface, per the error
/// handling design: the registry adapter recovers transient store
/// errors internally and only ever hands one of these to a caller.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ClusterErrorKind {
    /// Path/name validation, malformed config.
    InvalidArgument,
    /// Operation not permitted on this entity (e.g. Application::my_group).
    InvalidMethod,
    /// Entity is in the REMOVED state.
    ObjectRemoved,
    /// Terminal failure after the retry budget was exhausted.
    RepositoryConnectionLost,
    /// Non-retryable error from the store.
    RepositoryInternal,
    /// Holder lost its session while holding a lock.
    LockLost,
    /// A blocking primitive expired.
    Timeout,
    /// Malformed request/response, missing id, or double reply.
    JsonRpcInvocation,
}

/// A clusterlib error: a message plus the kind callers should branch on.
#[derive(Debug, Clone)]
pub struct ClusterError {
    pub message: String,
    pub kind: ClusterErrorKind,
}

impl ClusterError {
    pub fn new(message: impl Into<String>, kind: ClusterErrorKind) -> Self {
        ClusterError {
            message: message.into(),
            kind,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::InvalidArgument)
    }

    pub fn invalid_method(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::InvalidMethod)
    }

    pub fn object_removed(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::ObjectRemoved)
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::RepositoryConnectionLost)
    }

    pub fn repository_internal(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::RepositoryInternal)
    }

    pub fn lock_lost(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::LockLost)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::Timeout)
    }

    pub fn json_rpc_invocation(message: impl Into<String>) -> Self {
        Self::new(message, ClusterErrorKind::JsonRpcInvocation)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ClusterErrorKind {
        &self.kind
    }

    /// Whether the registry adapter's retry loop should retry the op that
    /// produced this error (see §4.1 retry policy: only these two kinds).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ClusterErrorKind::RepositoryConnectionLost | ClusterErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for ClusterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClusterError: {} - {:?}", self.message, self.kind)
    }
}

impl std::error::Error for ClusterError {}

impl From<std::io::Error> for ClusterError {
    fn from(err: std::io::Error) -> Self {
        ClusterError::new(err.to_string(), ClusterErrorKind::RepositoryInternal)
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::new(err.to_string(), ClusterErrorKind::JsonRpcInvocation)
    }
}

impl From<ParseIntError> for ClusterError {
    fn from(err: ParseIntError) -> Self {
        ClusterError::new(err.to_string(), ClusterErrorKind::InvalidArgument)
    }
}

/// Result alias used by every public clusterlib operation.
pub type ClResult<T> = Result<T, ClusterError>;
