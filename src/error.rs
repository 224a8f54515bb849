/// Error codes and the error type carried across every context boundary
use std::fmt;
use thiserror::Error;

/// Stable error codes placed in the `error` field of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ProviderNotFound,
    PhantomNotFound,
    ConnectFailed,
    TabCreateFailed,
    NoContentScript,
    NoTabs,
    WindowCreateFailed,
    UnknownError,
    Timeout,
    ConnectInProgress,
}

impl ErrorCode {
    const ALL: [ErrorCode; 10] = [
        ErrorCode::ProviderNotFound,
        ErrorCode::PhantomNotFound,
        ErrorCode::ConnectFailed,
        ErrorCode::TabCreateFailed,
        ErrorCode::NoContentScript,
        ErrorCode::NoTabs,
        ErrorCode::WindowCreateFailed,
        ErrorCode::UnknownError,
        ErrorCode::Timeout,
        ErrorCode::ConnectInProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProviderNotFound => "PROVIDER_NOT_FOUND",
            ErrorCode::PhantomNotFound => "PHANTOM_NOT_FOUND",
            ErrorCode::ConnectFailed => "CONNECT_FAILED",
            ErrorCode::TabCreateFailed => "TAB_CREATE_FAILED",
            ErrorCode::NoContentScript => "NO_CONTENT_SCRIPT",
            ErrorCode::NoTabs => "NO_TABS",
            ErrorCode::WindowCreateFailed => "WINDOW_CREATE_FAILED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConnectInProgress => "CONNECT_IN_PROGRESS",
        }
    }

    pub fn parse(s: &str) -> Option<ErrorCode> {
        Self::ALL.iter().copied().find(|code| code.as_str() == s)
    }

    /// The wallet is missing from the page, under either spelling
    pub fn is_provider_missing(&self) -> bool {
        matches!(self, ErrorCode::ProviderNotFound | ErrorCode::PhantomNotFound)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("{0}")]
    Code(ErrorCode),
    /// Free-form text from the provider or the messaging layer
    #[error("{0}")]
    Message(String),
}

impl HandshakeError {
    /// Use `message` when it carries any text, otherwise fall back to `fallback`
    pub fn message_or(message: Option<String>, fallback: ErrorCode) -> HandshakeError {
        match message {
            Some(text) if !text.trim().is_empty() => HandshakeError::from_wire(text),
            _ => HandshakeError::Code(fallback),
        }
    }

    /// Inverse of `wire()`: known codes come back as codes
    pub fn from_wire(text: String) -> HandshakeError {
        match ErrorCode::parse(&text) {
            Some(code) => HandshakeError::Code(code),
            None => HandshakeError::Message(text),
        }
    }

    pub fn wire(&self) -> String {
        self.to_string()
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            HandshakeError::Code(code) => Some(*code),
            HandshakeError::Message(_) => None,
        }
    }
}

impl From<ErrorCode> for HandshakeError {
    fn from(code: ErrorCode) -> Self {
        HandshakeError::Code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_parse_back() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("User rejected"), None);
    }

    #[test]
    fn test_message_or_falls_back_on_blank() {
        assert_eq!(
            HandshakeError::message_or(None, ErrorCode::ConnectFailed),
            HandshakeError::Code(ErrorCode::ConnectFailed)
        );
        assert_eq!(
            HandshakeError::message_or(Some("  ".to_string()), ErrorCode::NoContentScript),
            HandshakeError::Code(ErrorCode::NoContentScript)
        );
    }

    #[test]
    fn test_message_is_kept_verbatim() {
        let err = HandshakeError::message_or(Some("User rejected".to_string()), ErrorCode::ConnectFailed);
        assert_eq!(err.wire(), "User rejected");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_wire_text_that_names_a_code_is_a_code() {
        let err = HandshakeError::from_wire("NO_TABS".to_string());
        assert_eq!(err, HandshakeError::Code(ErrorCode::NoTabs));
    }

    #[test]
    fn test_both_missing_provider_spellings() {
        assert!(ErrorCode::ProviderNotFound.is_provider_missing());
        assert!(ErrorCode::PhantomNotFound.is_provider_missing());
        assert!(!ErrorCode::ConnectFailed.is_provider_missing());
    }
}
