use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input was invalid.
    Parameter,
    /// A lookup found nothing.
    ResourceNotFound,
    /// A downstream dependency (platform API, bus, database) failed.
    External,
    /// Anything else: serialization, broken internal invariants.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parameter => "parameter",
            Self::ResourceNotFound => "resource_not_found",
            Self::External => "external",
            Self::Internal => "internal",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            Self::Parameter => ErrorCategory::Parameter,
            Self::ResourceNotFound => ErrorCategory::Resource,
            Self::External => ErrorCategory::External,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Default HTTP status for the kind. External errors may carry their own upstream status.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Parameter => 400,
            Self::ResourceNotFound => 404,
            Self::External | Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    #[serde(rename = "PARAMETER_ERROR")]
    Parameter,
    #[serde(rename = "RESOURCE_ERROR")]
    Resource,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
    #[serde(rename = "EXTERNAL_ERROR")]
    External,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parameter => "PARAMETER_ERROR",
            Self::Resource => "RESOURCE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
            Self::External => "EXTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

/// The single error type every service in the workspace returns.
///
/// Constructors classify a cause into the narrowest kind. When the cause is already a
/// `ServiceError` it is returned unchanged, so repeated wrapping on the way up the stack never
/// reclassifies an error.
#[derive(Debug)]
pub struct ServiceError {
    kind: ErrorKind,
    client_message: Option<String>,
    status_code: Option<u16>,
    cause: Option<BoxError>,
}

impl ServiceError {
    fn classify(
        kind: ErrorKind,
        client_message: Option<String>,
        status_code: Option<u16>,
        cause: BoxError,
    ) -> Self {
        match cause.downcast::<ServiceError>() {
            Ok(classified) => *classified,
            Err(cause) => Self { kind, client_message, status_code, cause: Some(cause) },
        }
    }

    pub fn parameter(client_message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::classify(ErrorKind::Parameter, non_empty(client_message.into()), None, cause.into())
    }

    pub fn not_found(client_message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::classify(
            ErrorKind::ResourceNotFound,
            non_empty(client_message.into()),
            None,
            cause.into(),
        )
    }

    pub fn external(
        client_message: impl Into<String>,
        status_code: Option<u16>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::classify(
            ErrorKind::External,
            non_empty(client_message.into()),
            status_code,
            cause.into(),
        )
    }

    pub fn internal(client_message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::classify(ErrorKind::Internal, non_empty(client_message.into()), None, cause.into())
    }

    /// Build an error with no underlying cause, only a message.
    pub fn message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, client_message: non_empty(message.into()), status_code: None, cause: None }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::External => self.status_code.unwrap_or(500),
            kind => kind.status_code(),
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        self.status_code
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Message that is safe to hand back to an API client. Falls back to the internal description.
    pub fn client_message(&self) -> String {
        match &self.client_message {
            Some(message) => message.clone(),
            None => self.detail(),
        }
    }

    fn detail(&self) -> String {
        let mut detail = String::new();
        if let Some(status) = self.status_code {
            detail.push_str(&format!("{status}: "));
        }
        match (&self.cause, &self.client_message) {
            (Some(cause), _) => detail.push_str(&cause.to_string()),
            (None, Some(message)) => detail.push_str(message),
            (None, None) => detail.push_str(self.kind.as_str()),
        }
        detail
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.detail())
    }
}

impl StdError for ServiceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal("", error)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
