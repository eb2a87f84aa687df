use std::borrow::Cow;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unsupported image file format: {0}")]
    UnsupportedFormat(String),

    #[error("Image size exceeds limit")]
    TooLarge,

    #[error("Parameter missing or invalid: {0}")]
    Parameter(String),

    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    #[error("No images were analyzed")]
    NoImages,

    #[error("Frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("Index {index} out of range (size {size})")]
    IndexOutOfRange { index: String, size: String },

    #[error("Seek cancelled at frame {position}")]
    Cancelled { position: u64 },

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;

/// Stable machine-readable error kinds. The discriminants are the numeric
/// codes accepted by [`error_str`]; OS errors use the negated errno instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    Ok = 0,
    OutOfMemory = 1,
    Internal = 2,
    InvalidImage = 3,
    UnsupportedFormat = 4,
    TooLarge = 5,
    Parameter = 6,
    NoImages = 7,
    DimensionMismatch = 8,
    IndexOutOfRange = 9,
    Cancelled = 10,
    NotFound = 11,
    InvalidParameter = 12,
    Os = -1,
}

const KINDS: [ErrorKind; 13] = [
    ErrorKind::Ok,
    ErrorKind::OutOfMemory,
    ErrorKind::Internal,
    ErrorKind::InvalidImage,
    ErrorKind::UnsupportedFormat,
    ErrorKind::TooLarge,
    ErrorKind::Parameter,
    ErrorKind::NoImages,
    ErrorKind::DimensionMismatch,
    ErrorKind::IndexOutOfRange,
    ErrorKind::Cancelled,
    ErrorKind::NotFound,
    ErrorKind::InvalidParameter,
];

impl ErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::Ok => "",
            ErrorKind::OutOfMemory => "Out of memory",
            ErrorKind::Internal => "Internal error",
            ErrorKind::InvalidImage => "Invalid image",
            ErrorKind::UnsupportedFormat => "Unsupported image file format",
            ErrorKind::TooLarge => "Image size exceeds limit",
            ErrorKind::Parameter => "Parameter missing or invalid",
            ErrorKind::NoImages => "No images were analyzed",
            ErrorKind::DimensionMismatch => "Frame dimensions do not match analysis",
            ErrorKind::IndexOutOfRange => "Index out of range",
            ErrorKind::Cancelled => "Operation cancelled",
            ErrorKind::NotFound => "Not found",
            ErrorKind::InvalidParameter => "Parameter value out of range",
            ErrorKind::Os => "Operating system error",
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        if code < 0 {
            return Some(ErrorKind::Os);
        }
        KINDS.get(code as usize).copied()
    }

    /// Highest non-OS error code.
    pub fn max() -> i32 {
        KINDS.len() as i32 - 1
    }
}

impl ForensicsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForensicsError::OutOfMemory => ErrorKind::OutOfMemory,
            ForensicsError::Internal(_) => ErrorKind::Internal,
            ForensicsError::InvalidImage(_) => ErrorKind::InvalidImage,
            ForensicsError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ForensicsError::TooLarge => ErrorKind::TooLarge,
            ForensicsError::Parameter(_) => ErrorKind::Parameter,
            ForensicsError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            ForensicsError::NoImages => ErrorKind::NoImages,
            ForensicsError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            ForensicsError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            ForensicsError::Cancelled { .. } => ErrorKind::Cancelled,
            ForensicsError::MethodNotFound(_) => ErrorKind::NotFound,
            ForensicsError::Io(_) => ErrorKind::Os,
        }
    }

    /// Numeric code: the kind's discriminant, or the negated OS error code for
    /// I/O failures that carry one.
    pub fn code(&self) -> i32 {
        match self {
            ForensicsError::Io(e) => match e.raw_os_error() {
                Some(errno) => -errno,
                None => ErrorKind::Internal.code(),
            },
            other => other.kind().code(),
        }
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ForensicsError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) fn invalid_image(msg: impl Into<String>) -> Self {
        ForensicsError::InvalidImage(msg.into())
    }
}

impl From<image::ImageError> for ForensicsError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => ForensicsError::Io(e),
            image::ImageError::Unsupported(e) => ForensicsError::UnsupportedFormat(e.to_string()),
            image::ImageError::Limits(_) => ForensicsError::TooLarge,
            image::ImageError::Parameter(e) => ForensicsError::Parameter(e.to_string()),
            other => ForensicsError::InvalidImage(other.to_string()),
        }
    }
}

/// Human-readable message for a numeric error code.
///
/// Defined for every taxonomy code including `0`; negative codes are OS error
/// numbers and render the platform message. Returns `None` for codes above
/// [`ErrorKind::max`].
pub fn error_str(code: i32) -> Option<Cow<'static, str>> {
    if code < 0 {
        return Some(Cow::Owned(
            std::io::Error::from_raw_os_error(-code).to_string(),
        ));
    }
    ErrorKind::from_code(code).map(|kind| Cow::Borrowed(kind.message()))
}
