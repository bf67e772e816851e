//! Error types shared across gifstream crates.
//!
//! Two layers live here:
//! - [`StatusCode`]: the closed set of integer codes the native engine
//!   reports, including the codes the callback bridges hand back to it.
//! - [`GifstreamError`]: the typed error returned to callers of the
//!   session API.

/// Status codes exchanged with the native engine.
///
/// The integer numbering is fixed by the engine ABI. Mapping from raw
/// integers is total: anything the engine might add later becomes
/// [`StatusCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum StatusCode {
    #[error("success")]
    Success,

    #[error("one of the input arguments was null")]
    NullArgument,

    #[error("a one-time function was called twice, or functions were called in the wrong order")]
    InvalidState,

    #[error("palette quantization failed")]
    QuantizationFailure,

    #[error("GIF composition failed")]
    FormatComposeFailure,

    #[error("engine worker thread was lost")]
    ConcurrencyFailure,

    #[error("I/O error: not found")]
    NotFound,

    #[error("I/O error: permission denied")]
    PermissionDenied,

    #[error("I/O error: already exists")]
    AlreadyExists,

    #[error("invalid arguments passed to the engine")]
    InvalidInput,

    #[error("I/O error: timed out")]
    TimedOut,

    #[error("I/O error: zero-byte write")]
    ZeroByteWrite,

    #[error("I/O error: interrupted")]
    Interrupted,

    #[error("I/O error: unexpected end of input")]
    UnexpectedEndOfInput,

    #[error("operation aborted by the output sink or progress consumer")]
    Aborted,

    #[error("output sink failure")]
    Other,

    #[error("unrecognized engine status code {0}")]
    Unknown(i32),
}

impl StatusCode {
    /// Raw value the engine uses for success.
    pub const OK: i32 = 0;

    /// Map a raw engine code onto the taxonomy.
    pub const fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::NullArgument,
            2 => Self::InvalidState,
            3 => Self::QuantizationFailure,
            4 => Self::FormatComposeFailure,
            5 => Self::ConcurrencyFailure,
            6 => Self::NotFound,
            7 => Self::PermissionDenied,
            8 => Self::AlreadyExists,
            9 => Self::InvalidInput,
            10 => Self::TimedOut,
            11 => Self::ZeroByteWrite,
            12 => Self::Interrupted,
            13 => Self::UnexpectedEndOfInput,
            14 => Self::Aborted,
            15 => Self::Other,
            other => Self::Unknown(other),
        }
    }

    /// The raw integer passed across the engine boundary.
    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::NullArgument => 1,
            Self::InvalidState => 2,
            Self::QuantizationFailure => 3,
            Self::FormatComposeFailure => 4,
            Self::ConcurrencyFailure => 5,
            Self::NotFound => 6,
            Self::PermissionDenied => 7,
            Self::AlreadyExists => 8,
            Self::InvalidInput => 9,
            Self::TimedOut => 10,
            Self::ZeroByteWrite => 11,
            Self::Interrupted => 12,
            Self::UnexpectedEndOfInput => 13,
            Self::Aborted => 14,
            Self::Other => 15,
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Whether the code belongs to the I/O class (sink, filesystem, or abort).
    pub fn is_io(self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::PermissionDenied
                | Self::AlreadyExists
                | Self::TimedOut
                | Self::ZeroByteWrite
                | Self::Interrupted
                | Self::UnexpectedEndOfInput
                | Self::Aborted
                | Self::Other
        )
    }

    /// Convert into a `Result`, treating everything except success as an error.
    pub fn into_result(self) -> Result<(), StatusCode> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        Self::from_raw(code)
    }
}

impl From<std::io::ErrorKind> for StatusCode {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;
        match kind {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::AlreadyExists => Self::AlreadyExists,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => Self::InvalidInput,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::WriteZero => Self::ZeroByteWrite,
            ErrorKind::Interrupted => Self::Interrupted,
            ErrorKind::UnexpectedEof => Self::UnexpectedEndOfInput,
            _ => Self::Other,
        }
    }
}

/// Top-level error type for gifstream operations.
#[derive(Debug, thiserror::Error)]
pub enum GifstreamError {
    #[error("Engine initialization failed: {message}")]
    EngineInit { message: String },

    #[error("Engine error: {0}")]
    Engine(#[from] StatusCode),

    #[error("Invalid session state: {message}")]
    InvalidState { message: String },

    #[error("Invalid frame buffer: expected {expected} bytes (width * height * 4), got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GifstreamError.
pub type GifstreamResult<T> = Result<T, GifstreamError>;

impl GifstreamError {
    pub fn engine_init(msg: impl Into<String>) -> Self {
        Self::EngineInit {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Translate a raw engine return value.
    pub fn check(code: i32) -> GifstreamResult<()> {
        StatusCode::from_raw(code).into_result().map_err(Self::Engine)
    }

    /// The engine status behind this error, if it came from the engine.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Engine(code) => Some(*code),
            _ => None,
        }
    }

    /// True for lifecycle violations, whether detected here or by the engine.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::Engine(StatusCode::InvalidState)
        )
    }

    /// True for I/O-class failures, including sink aborts.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Engine(code) => code.is_io(),
            _ => false,
        }
    }
}
