//! Error types for colloquy.
//!
//! Every fallible operation in the crate returns [`Result`].  The variants split into two
//! groups: configuration errors that stop the process at startup, and per-turn errors that
//! abort one turn and leave the session usable.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

/// The main error type for colloquy.
#[derive(Clone, Debug)]
pub enum Error {
    /// The configured model identifier is not in the provider catalog.
    UnknownModel {
        /// The identifier that was requested.
        model_id: String,
        /// Every identifier the catalog knows, in catalog order.
        valid: Vec<String>,
    },

    /// The provider family has no request or response adaptation.
    UnsupportedProvider {
        /// Name of the provider family.
        provider: String,
    },

    /// A streamed chunk could not be decoded.
    Decode {
        /// What went wrong.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A generic API error returned by the inference service.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error type string from the service.
        error_type: Option<String>,
        /// What went wrong.
        message: String,
        /// Value of `x-amzn-requestid`, when present.
        request_id: Option<String>,
    },

    /// Authentication error.
    Authentication {
        /// What went wrong.
        message: String,
    },

    /// The token is valid but lacks access to the model.
    Permission {
        /// What went wrong.
        message: String,
    },

    /// Rate limit or quota exceeded.
    RateLimit {
        /// What went wrong.
        message: String,
        /// Suggested back-off in seconds.
        retry_after: Option<u64>,
    },

    /// The service rejected the request body.
    BadRequest {
        /// What went wrong.
        message: String,
    },

    /// Request timed out.
    Timeout {
        /// What went wrong.
        message: String,
        /// Elapsed seconds, when known.
        duration: Option<f64>,
    },

    /// Connection error.
    Connection {
        /// What went wrong.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Service is overloaded or unavailable.
    ServiceUnavailable {
        /// What went wrong.
        message: String,
        /// Suggested back-off in seconds.
        retry_after: Option<u64>,
    },

    /// The response stream failed after it was opened.
    Streaming {
        /// What went wrong.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Optical character recognition failed.
    Ocr {
        /// What went wrong.
        message: String,
    },

    /// Speech transcription failed.
    Transcription {
        /// What went wrong.
        message: String,
    },

    /// The transcriber heard nothing that could be turned into text.
    NoSpeechDetected,

    /// The passage retriever failed.
    Retrieval {
        /// What went wrong.
        message: String,
    },

    /// Error during JSON or YAML serialization or deserialization.
    Serialization {
        /// What went wrong.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// What went wrong.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// HTTP client error.
    HttpClient {
        /// What went wrong.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// An endpoint URL could not be parsed or extended.
    Url {
        /// What went wrong.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },

    /// Invalid input supplied by the caller.
    Validation {
        /// What went wrong.
        message: String,
        /// Name of the offending setting.
        param: Option<String>,
    },

    /// Invalid process configuration.
    Configuration {
        /// What went wrong.
        message: String,
    },
}

impl Error {
    /// Shorthand for an unknown model error.
    pub fn unknown_model(model_id: impl Into<String>, valid: Vec<String>) -> Self {
        Error::UnknownModel {
            model_id: model_id.into(),
            valid,
        }
    }

    /// Shorthand for an unsupported provider error.
    pub fn unsupported_provider(provider: impl Into<String>) -> Self {
        Error::UnsupportedProvider {
            provider: provider.into(),
        }
    }

    /// Shorthand for a decode error.
    pub fn decode(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Decode {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Shorthand for an API error.
    pub fn api(
        status_code: u16,
        error_type: Option<String>,
        message: String,
        request_id: Option<String>,
    ) -> Self {
        Error::Api {
            status_code,
            error_type,
            message,
            request_id,
        }
    }

    /// Shorthand for an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// Shorthand for a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Error::Permission {
            message: message.into(),
        }
    }

    /// Shorthand for a rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Shorthand for a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Shorthand for a connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Shorthand for a service unavailable error.
    pub fn service_unavailable(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    /// Shorthand for a streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Shorthand for an OCR error.
    pub fn ocr(message: impl Into<String>) -> Self {
        Error::Ocr {
            message: message.into(),
        }
    }

    /// Shorthand for a transcription error.
    pub fn transcription(message: impl Into<String>) -> Self {
        Error::Transcription {
            message: message.into(),
        }
    }

    /// Shorthand for a retrieval error.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Error::Retrieval {
            message: message.into(),
        }
    }

    /// Shorthand for a serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Shorthand for an I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Shorthand for an HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Shorthand for a URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if the model identifier was not found in the catalog.
    pub fn is_unknown_model(&self) -> bool {
        matches!(self, Error::UnknownModel { .. })
    }

    /// Returns true if the provider family is not supported.
    pub fn is_unsupported_provider(&self) -> bool {
        matches!(self, Error::UnsupportedProvider { .. })
    }

    /// Returns true if a chunk failed to decode.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// Returns true if this error came from the inference transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Api { .. }
                | Error::Authentication { .. }
                | Error::Permission { .. }
                | Error::RateLimit { .. }
                | Error::BadRequest { .. }
                | Error::Timeout { .. }
                | Error::Connection { .. }
                | Error::ServiceUnavailable { .. }
                | Error::Streaming { .. }
                | Error::HttpClient { .. }
        )
    }

    /// Returns true if this error came from an input collaborator (OCR or speech), in which
    /// case no request was ever built.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Error::Ocr { .. } | Error::Transcription { .. } | Error::NoSpeechDetected
        )
    }

    /// Returns true if this error must stop the process.
    ///
    /// Everything else aborts a single turn and the interactive loop resumes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnknownModel { .. } | Error::Configuration { .. })
    }

    /// The service request id, if the error carries one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Api { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownModel { model_id, valid } => {
                write!(
                    f,
                    "Unknown model: {model_id} (valid models: {})",
                    valid.join(", ")
                )
            }
            Error::UnsupportedProvider { provider } => {
                write!(f, "Unsupported provider: {provider}")
            }
            Error::Decode { message, .. } => {
                write!(f, "Decode error: {message}")
            }
            Error::Api {
                message,
                error_type,
                request_id,
                ..
            } => {
                if let Some(error_type) = error_type {
                    if let Some(request_id) = request_id {
                        write!(f, "{error_type}: {message} [request {request_id}]")
                    } else {
                        write!(f, "{error_type}: {message}")
                    }
                } else if let Some(request_id) = request_id {
                    write!(f, "API error: {message} [request {request_id}]")
                } else {
                    write!(f, "API error: {message}")
                }
            }
            Error::Authentication { message } => {
                write!(f, "Authentication error: {message}")
            }
            Error::Permission { message } => {
                write!(f, "Permission error: {message}")
            }
            Error::RateLimit {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Throttled: {message} (retry in {retry_after}s)"
                    )
                } else {
                    write!(f, "Throttled: {message}")
                }
            }
            Error::BadRequest { message } => {
                write!(f, "Bad request: {message}")
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timed out: {message} (after {duration}s)")
                } else {
                    write!(f, "Timed out: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Service not available: {message} (retry in {retry_after}s)"
                    )
                } else {
                    write!(f, "Service not available: {message}")
                }
            }
            Error::Streaming { message, .. } => {
                write!(f, "Streaming error: {message}")
            }
            Error::Ocr { message } => {
                write!(f, "OCR error: {message}")
            }
            Error::Transcription { message } => {
                write!(f, "Transcription error: {message}")
            }
            Error::NoSpeechDetected => {
                write!(f, "No speech detected")
            }
            Error::Retrieval { message } => {
                write!(f, "Retrieval error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} [{param}]")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Configuration { message } => {
                write!(f, "Configuration error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Decode { source, .. }
            | Error::Connection { source, .. }
            | Error::Streaming { source, .. }
            | Error::Serialization { source, .. }
            | Error::HttpClient { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source.as_ref()),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("bad URL: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::decode(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::decode(format!("base64 error: {err}"), Some(Box::new(err)))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::timeout(format!("Request timed out: {err}"), None)
        } else if err.is_connect() {
            Error::connection(format!("Connection error: {err}"), Some(Box::new(err)))
        } else {
            Error::http_client(format!("Request failed: {err}"), Some(Box::new(err)))
        }
    }
}

/// A specialized Result type for colloquy operations.
pub type Result<T> = std::result::Result<T, Error>;
