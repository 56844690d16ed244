use std::fmt;

use sdl::parser::ParseError;
use sdl::pos::SourceRange;

/// What went wrong during evaluation or binding.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("cyclic reference to {0:?}")]
    CyclicReference(String),
    #[error("{0}")]
    UnknownReference(String),
    #[error("invalid reference used in {0}")]
    InvalidReference(String),
    #[error("missing value for required variable {0:?}")]
    UndefinedVariable(String),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    DuplicateLabelDefinition(String),
    #[error("no {kind} registered for {name:?}")]
    UnresolvedHook { kind: &'static str, name: String },
    #[error("{field}: {reason}")]
    Binding { field: String, reason: String },
    #[error("{}", .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Parse(Vec<ParseError>),
    #[error("{block}: {source}")]
    Hook {
        block: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{}", .0.join("\n"))]
    Validation(Vec<String>),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An evaluation error, optionally located in the source.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub range: Option<SourceRange>,
    /// Prefix naming what was being evaluated, e.g. `variable "domains"`.
    pub context: Option<String>,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            range: None,
            context: None,
        }
    }

    /// An error located at `range`. Synthetic ranges are dropped so messages
    /// never carry a meaningless `0,0-0` prefix.
    pub fn at(kind: ErrorKind, range: &SourceRange) -> Self {
        Error {
            kind,
            range: (!range.is_synthetic()).then(|| range.clone()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if self.context.is_none() {
            self.context = Some(context.into());
        }
        self
    }

    pub(crate) fn type_mismatch(reason: impl Into<String>, range: &SourceRange) -> Self {
        Error::at(ErrorKind::TypeMismatch(reason.into()), range)
    }

    pub(crate) fn unknown(message: impl Into<String>, range: &SourceRange) -> Self {
        Error::at(ErrorKind::UnknownReference(message.into()), range)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(range) = &self.range {
            write!(f, "{}: ", range)?;
        }
        if let Some(context) = &self.context {
            write!(f, "{}: ", context)?;
        }
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Hook { source, .. } => Some(source.as_ref()),
            ErrorKind::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
