use serde::Serialize;
use std::error::Error as StdError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SshError>;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SshErrorKind {
    Connection,
    Authentication,
    FileNotFound,
    FileExists,
    NotAFile,
    NotADirectory,
    InvalidArgument,
    Operation,
}

impl SshErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            SshErrorKind::Connection => "CONNECTION",
            SshErrorKind::Authentication => "AUTHENTICATION",
            SshErrorKind::FileNotFound => "FILE_NOT_FOUND",
            SshErrorKind::FileExists => "FILE_EXISTS",
            SshErrorKind::NotAFile => "NOT_A_FILE",
            SshErrorKind::NotADirectory => "NOT_A_DIRECTORY",
            SshErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            SshErrorKind::Operation => "SSH_OPERATION",
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SshError {
    pub kind: SshErrorKind,
    pub message: String,
    pub path: Option<String>,
    pub hint: Option<String>,
    #[source]
    source: Option<BoxedCause>,
}

impl SshError {
    pub fn new(kind: SshErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            hint: None,
            source: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(SshErrorKind::Connection, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(SshErrorKind::Authentication, message)
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::new(SshErrorKind::FileNotFound, format!("File not found: {}", path)).with_path(path)
    }

    pub fn local_file_not_found(path: &str) -> Self {
        Self::new(
            SshErrorKind::FileNotFound,
            format!("Local file not found: {}", path),
        )
        .with_path(path)
    }

    pub fn file_exists(path: &str) -> Self {
        Self::new(
            SshErrorKind::FileExists,
            format!("File already exists: {}", path),
        )
        .with_path(path)
    }

    pub fn not_a_file(path: &str) -> Self {
        Self::new(SshErrorKind::NotAFile, format!("Not a file: {}", path)).with_path(path)
    }

    pub fn not_a_directory(path: &str) -> Self {
        Self::new(
            SshErrorKind::NotADirectory,
            format!("Not a directory: {}", path),
        )
        .with_path(path)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(SshErrorKind::InvalidArgument, message)
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(SshErrorKind::Operation, message)
    }

    pub fn wrap<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let context = context.into();
        let message = if context.is_empty() {
            cause.to_string()
        } else {
            format!("{}: {}", context, cause)
        };
        Self::operation(message).with_source(cause)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_kind(&self, kind: SshErrorKind) -> bool {
        self.kind == kind
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "code": self.code(),
            "message": self.message,
            "path": self.path,
            "hint": self.hint,
            "cause": self.source.as_ref().map(|err| err.to_string()),
        })
    }
}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        SshError::wrap("I/O error", err)
    }
}
