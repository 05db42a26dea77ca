//! Unified error type for mixvault.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`]
//! and a stable machine-readable code via [`Error::code`].

use std::fmt;

/// Unified error type covering all failure modes in mixvault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "user", "video").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks permission for the requested action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller has no download plan at all.
    #[error("Membership required")]
    MembershipRequired,

    /// The caller's remaining credits do not cover the resolved track count.
    #[error("Insufficient credits: {required} required, {remaining} remaining")]
    InsufficientCredits {
        /// Credits needed for the resolved track list.
        required: u32,
        /// Credits currently available to the caller.
        remaining: u32,
    },

    /// Every requested video was unknown or inaccessible.
    #[error("No accessible videos in selection")]
    NoAccessibleVideos,

    /// A content source could not be read.
    #[error("Source unavailable [{key}]: {message}")]
    SourceUnavailable {
        /// Content key of the failing source.
        key: String,
        /// Human-readable error description.
        message: String,
    },

    /// Writing the archive failed.
    #[error("Archive write failed: {source}")]
    SinkWrite {
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The requested export artifact does not exist.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// The job was cancelled by the caller.
    #[error("Export cancelled")]
    Cancelled,

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::MembershipRequired => 402,
            Error::InsufficientCredits { .. } => 402,
            Error::NoAccessibleVideos => 422,
            Error::SourceUnavailable { .. } => 502,
            Error::SinkWrite { .. } => 500,
            Error::ArtifactNotFound(_) => 404,
            Error::Cancelled => 499,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::Validation(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::MembershipRequired => "membership_required",
            Error::InsufficientCredits { .. } => "insufficient_credits",
            Error::NoAccessibleVideos => "no_accessible_videos",
            Error::SourceUnavailable { .. } => "source_unavailable",
            Error::SinkWrite { .. } => "sink_write_error",
            Error::ArtifactNotFound(_) => "artifact_not_found",
            Error::Cancelled => "cancelled",
            Error::Database { .. } => "database_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::SourceUnavailable`].
    pub fn source_unavailable(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::SourceUnavailable {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::SinkWrite`].
    pub fn sink(source: std::io::Error) -> Self {
        Error::SinkWrite { source }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("video", 42);
        assert_eq!(err.to_string(), "video not found: 42");
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn insufficient_credits_display() {
        let err = Error::InsufficientCredits {
            required: 3,
            remaining: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits: 3 required, 2 remaining"
        );
        assert_eq!(err.http_status(), 402);
        assert_eq!(err.code(), "insufficient_credits");
    }

    #[test]
    fn membership_required_is_payment_required() {
        assert_eq!(Error::MembershipRequired.http_status(), 402);
    }

    #[test]
    fn no_accessible_videos_is_unprocessable() {
        let err = Error::NoAccessibleVideos;
        assert_eq!(err.http_status(), 422);
        assert_eq!(err.code(), "no_accessible_videos");
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("name is required".into());
        assert_eq!(err.to_string(), "Validation error: name is required");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn source_unavailable_display() {
        let err = Error::source_unavailable("videos/a.mp4", "connection reset");
        assert_eq!(
            err.to_string(),
            "Source unavailable [videos/a.mp4]: connection reset"
        );
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn sink_write_is_server_error() {
        let err = Error::sink(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn artifact_not_found_is_404() {
        let err = Error::ArtifactNotFound("mix-1234.zip".into());
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "artifact_not_found");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn database_display() {
        let err = Error::database("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.code(), "database_error");
    }
}
