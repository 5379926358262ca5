use http::StatusCode;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each feature crate's error type. The caller-facing layer
/// renders these into an `OpenAI`-style error body, keeping domain errors
/// decoupled from the server framework.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `rate_limit_exceeded`)
    fn error_type(&self) -> &str;

    /// Machine-readable error code, when the error carries one
    fn error_code(&self) -> Option<&str> {
        None
    }

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String {
        self.to_string()
    }
}
