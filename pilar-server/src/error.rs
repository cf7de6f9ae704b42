//! Request-scoped error taxonomy
//!
//! Every failure of a prediction request ends up as one [`PredictError`].
//! Its [`ErrorKind`] is the machine-readable code sent to clients; the
//! variant payload carries detail for the logs only.

use axum::http::StatusCode;
use pilar_vision::VisionError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    EmptyPayload,
    MalformedRequest,
    UnsupportedMediaType,
    PayloadTooLarge,
    DecodeError,
    UnsupportedFormat,
    InvalidDimensions,
    ServiceUnavailable,
    InferenceError,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::EmptyPayload,
        ErrorKind::MalformedRequest,
        ErrorKind::UnsupportedMediaType,
        ErrorKind::PayloadTooLarge,
        ErrorKind::DecodeError,
        ErrorKind::UnsupportedFormat,
        ErrorKind::InvalidDimensions,
        ErrorKind::ServiceUnavailable,
        ErrorKind::InferenceError,
        ErrorKind::Timeout,
        ErrorKind::Internal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyPayload => "EMPTY_PAYLOAD",
            ErrorKind::MalformedRequest => "MALFORMED_REQUEST",
            ErrorKind::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ErrorKind::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorKind::DecodeError => "DECODE_ERROR",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::InvalidDimensions => "INVALID_DIMENSIONS",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::InferenceError => "INFERENCE_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::EmptyPayload
            | ErrorKind::MalformedRequest
            | ErrorKind::DecodeError
            | ErrorKind::InvalidDimensions => StatusCode::BAD_REQUEST,
            ErrorKind::UnsupportedMediaType | ErrorKind::UnsupportedFormat => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InferenceError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Empty file payload")]
    EmptyPayload,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32, min: u32, max: u32 },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::EmptyPayload => ErrorKind::EmptyPayload,
            PredictError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            PredictError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            PredictError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            PredictError::Decode(_) => ErrorKind::DecodeError,
            PredictError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            PredictError::InvalidDimensions { .. } => ErrorKind::InvalidDimensions,
            PredictError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            PredictError::Inference(_) => ErrorKind::InferenceError,
            PredictError::Timeout(_) => ErrorKind::Timeout,
            PredictError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    /// Client-correctable input problems, as opposed to operator or deployment faults
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EmptyPayload
                | ErrorKind::MalformedRequest
                | ErrorKind::UnsupportedMediaType
                | ErrorKind::PayloadTooLarge
                | ErrorKind::DecodeError
                | ErrorKind::UnsupportedFormat
                | ErrorKind::InvalidDimensions
        )
    }

    /// Short message safe to show to clients. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PredictError::EmptyPayload => "File gambar kosong".to_string(),
            PredictError::MalformedRequest(_) => "Permintaan tidak valid, kirim gambar pada field 'file'".to_string(),
            PredictError::UnsupportedMediaType(_) => "Format file tidak didukung, kirim file gambar".to_string(),
            PredictError::PayloadTooLarge { limit, .. } => {
                format!("File terlalu besar (maksimal {})", human_size(*limit))
            }
            PredictError::Decode(_) => "Gambar rusak atau tidak dapat dibaca".to_string(),
            PredictError::UnsupportedFormat(_) => "Format gambar tidak dikenali".to_string(),
            PredictError::InvalidDimensions { min, max, .. } => {
                format!("Ukuran gambar harus antara {min}x{min} dan {max}x{max} piksel")
            }
            PredictError::ServiceUnavailable(_) => "Model belum siap, silakan coba beberapa saat lagi".to_string(),
            PredictError::Inference(_) => "Gagal memproses gambar".to_string(),
            PredictError::Timeout(_) => "Waktu pemrosesan habis, silakan coba lagi".to_string(),
            PredictError::Internal(_) => "Terjadi kesalahan pada server".to_string(),
        }
    }
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

impl From<VisionError> for PredictError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Decode(msg) => PredictError::Decode(msg),
            VisionError::UnsupportedFormat(msg) => PredictError::UnsupportedFormat(msg),
            VisionError::InvalidDimensions { width, height, min, max } => {
                PredictError::InvalidDimensions { width, height, min, max }
            }
            VisionError::ModelNotLoaded(msg) => PredictError::ServiceUnavailable(msg),
            VisionError::Inference(msg) => PredictError::Inference(msg),
            other => PredictError::Internal(other.to_string()),
        }
    }
}
