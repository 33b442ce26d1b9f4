//! Error types and the joining strategy used throughout the runtime.
//!
//! Every failure the runtime can produce is an [`Error`] with a stable
//! [`ErrorKind`]. Errors compose: joining two errors keeps both
//! identities, so callers match with [`Error::has_kind`] rather than by
//! message. Handler-provided errors use the [`ErrorKind::User`] kind and
//! carry their text as context.

use core::fmt;

/// The kind of error.
///
/// Kinds are the stable matching surface: messages may gain context, but
/// `kind` identities survive joining and wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Store ===
    /// A store operation referenced an id with no registered cell.
    StateNotRegistered,
    /// `Store::register` was called twice for the same id.
    StateAlreadyRegistered,

    // === Runner ===
    /// `Runner::register` was called twice for the same id.
    HandlerAlreadyRegistered,
    /// `Runner::run` was called on a runner that already started.
    RunnerAlreadyStarted,

    // === Handler results ===
    /// The handler was skipped by a condition layer.
    Skipped,
    /// A failure on the critical path; aborts the whole run.
    CriticalPath,
    /// The context's deadline passed.
    DeadlineExceeded,
    /// The context was cancelled.
    Cancelled,
    /// A panicking handler was caught and reified.
    PanicRecovered,

    // === Typed reads ===
    /// A typed read found a value of a different type.
    InvalidType,

    // === User ===
    /// Handler-provided error.
    User,
}

impl ErrorKind {
    /// Returns the stable human-readable message for this kind.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::StateNotRegistered => "state not registered",
            Self::StateAlreadyRegistered => "state already registered",
            Self::HandlerAlreadyRegistered => "handler already registered",
            Self::RunnerAlreadyStarted => "runner already started",
            Self::Skipped => "handler was skipped",
            Self::CriticalPath => "failure on critical path",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Cancelled => "context cancelled",
            Self::PanicRecovered => "panic recover",
            Self::InvalidType => "invalid type",
            Self::User => "handler error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The error type for runtime operations.
///
/// An error is a primary kind, optional context text, and a list of
/// related errors accumulated by joining. Kind matching traverses the
/// whole join tree.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    related: Vec<Error>,
}

impl Error {
    /// Creates a new error with the given kind and no context.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            related: Vec::new(),
        }
    }

    /// Creates a handler-provided ([`ErrorKind::User`]) error with the
    /// given message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(message)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Returns the primary error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error or any joined error has the given kind.
    #[must_use]
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind || self.related.iter().any(|e| e.has_kind(kind))
    }

    /// Appends `other` to this error's join set, keeping `self` primary.
    #[must_use]
    pub fn also(mut self, other: Self) -> Self {
        self.related.push(other);
        self
    }

    /// Joins two optional errors.
    ///
    /// Either side absent yields the other; both present joins `b` under
    /// `a`'s primary kind. Both identities stay matchable through
    /// [`Error::has_kind`].
    #[must_use]
    pub fn join(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => Some(a.also(b)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.context) {
            // User errors are all context; the kind label adds nothing.
            (ErrorKind::User, Some(ctx)) => write!(f, "{ctx}")?,
            (kind, Some(ctx)) => write!(f, "{kind}: {ctx}")?,
            (kind, None) => write!(f, "{kind}")?,
        }
        for related in &self.related {
            write!(f, "; {related}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.related.first().map(|e| e as _)
    }
}
