use thiserror::Error;

pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    AuthenticationRequired,
    BadRequest,
    SubmissionFailed,
    JobFailed,
    Timeout,
    Unexpected,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "authentication_required",
            Self::BadRequest => "bad_request",
            Self::SubmissionFailed => "submission_failed",
            Self::JobFailed => "job_failed",
            Self::Timeout => "timeout",
            Self::Unexpected => "unexpected",
        }
    }
}

/// Every way a try-on submission can end without results. Transient polling
/// failures never appear here; the poller absorbs them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryOnError {
    #[error("API key required. Please provide your FASHN API key.")]
    MissingApiKey,
    #[error("Invalid API key. Please check your FASHN API key and try again.")]
    InvalidApiKey,
    #[error("{0}")]
    BadRequest(String),
    #[error("API run failed: {detail}")]
    SubmissionRejected { status: u16, detail: String },
    #[error("Failed to reach FASHN API: {0}")]
    ProviderUnreachable(String),
    #[error("Failed to get prediction ID from FASHN API")]
    MissingJobId,
    #[error("Prediction failed: {reason}")]
    JobFailed { job_id: String, reason: String },
    #[error("Maximum polling time exceeded.")]
    Timeout { job_id: Option<String>, polls: u32 },
    #[error("An unexpected error occurred")]
    Unexpected(String),
}

impl TryOnError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingApiKey | Self::InvalidApiKey => FailureKind::AuthenticationRequired,
            Self::BadRequest(_) => FailureKind::BadRequest,
            Self::SubmissionRejected { .. } | Self::ProviderUnreachable(_) | Self::MissingJobId => {
                FailureKind::SubmissionFailed
            }
            Self::JobFailed { .. } => FailureKind::JobFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Unexpected(_) => FailureKind::Unexpected,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingApiKey | Self::InvalidApiKey => 401,
            Self::BadRequest(_) => 400,
            Self::SubmissionRejected { status, .. } if (400..=599).contains(status) => *status,
            Self::SubmissionRejected { .. } => 502,
            Self::ProviderUnreachable(_) => 502,
            Self::MissingJobId | Self::JobFailed { .. } | Self::Unexpected(_) => 500,
            Self::Timeout { .. } => 504,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.kind() == FailureKind::AuthenticationRequired
    }
}
