use crate::tpl::ast::Token;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents errors that can occur while compiling or rendering templates.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{message}")]
    Syntax {
        message: String,
        token: Option<Box<Token>>,
    },
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),
    #[error("Unknown helper: {0}")]
    UnknownHelper(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Compiled template error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>, token: &Token) -> Self {
        Error::Syntax {
            message: message.into(),
            token: Some(Box::new(token.clone())),
        }
    }

    /// The offending token of a syntax error, if one was recorded.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Error::Syntax { token, .. } => token.as_deref(),
            _ => None,
        }
    }

    pub fn template_name(&self) -> Option<&str> {
        match self {
            Error::UnknownTemplate(name) => Some(name),
            _ => None,
        }
    }

    pub fn filter_name(&self) -> Option<&str> {
        match self {
            Error::UnknownFilter(name) => Some(name),
            _ => None,
        }
    }

    pub fn helper_name(&self) -> Option<&str> {
        match self {
            Error::UnknownHelper(name) => Some(name),
            _ => None,
        }
    }
}
