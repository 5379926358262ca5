use http::StatusCode;
use thiserror::Error;
use tollway_core::HttpError;

/// Errors that can occur while fetching or inspecting remote media
#[derive(Debug, Error)]
pub enum MediaError {
    /// The HTTP request itself failed
    #[error("media request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Worker downloads only accept `https` sources
    #[error("worker downloads require an https url: {0}")]
    InsecureUrl(String),

    /// The body is larger than the configured ceiling
    #[error("media exceeds the {limit} byte limit")]
    Oversize {
        /// Ceiling in bytes
        limit: u64,
    },

    /// The source answered with an unexpected status
    #[error("media source returned status {0}")]
    Status(StatusCode),

    /// The body is not an image
    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    /// No decoder could read the image header
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Reading the body failed
    #[error("failed to read media body: {0}")]
    Io(#[from] std::io::Error),

    /// Inline data was not valid base64
    #[error("invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl HttpError for MediaError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Request(_) | Self::Status(_) => StatusCode::BAD_GATEWAY,
            Self::InsecureUrl(_)
            | Self::Oversize { .. }
            | Self::InvalidContentType(_)
            | Self::Decode(_)
            | Self::Base64(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Request(_) | Self::Status(_) | Self::Io(_) => "upstream_error",
            Self::InsecureUrl(_)
            | Self::Oversize { .. }
            | Self::InvalidContentType(_)
            | Self::Decode(_)
            | Self::Base64(_) => "invalid_request_error",
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Oversize { .. } => Some("image_too_large"),
            Self::InvalidContentType(_) | Self::Decode(_) | Self::Base64(_) => Some("invalid_image"),
            _ => None,
        }
    }
}
