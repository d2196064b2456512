use std::{borrow::Cow, error::Error, fmt};

/// Errors from driving the terminal.
#[derive(Debug)]
pub enum GuiError {
    /// Returned when formatting a widget fails.
    FmtError(fmt::Error),
    /// Returned when the terminal cannot be set up, drawn to or read from.
    IOError(std::io::Error),
}

impl fmt::Display for GuiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::FmtError(error) => Cow::from(format!("fmt error: {}", error)),
            Self::IOError(error) => Cow::from(format!("terminal io error: {}", error)),
        };
        write!(f, "{}", msg)
    }
}

impl Error for GuiError {}

impl From<fmt::Error> for GuiError {
    fn from(value: fmt::Error) -> Self {
        Self::FmtError(value)
    }
}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
