use serde::Serialize;

use crate::tryon::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Validation,
    Provider,
    Timeout,
    Infra,
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::AuthenticationRequired => Self::Auth,
            FailureKind::BadRequest => Self::Validation,
            FailureKind::SubmissionFailed | FailureKind::JobFailed => Self::Provider,
            FailureKind::Timeout => Self::Timeout,
            FailureKind::Unexpected => Self::Infra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub error_kind: ErrorKind,
    pub error_code: &'static str,
    #[serde(rename = "requiresApiKey", skip_serializing_if = "std::ops::Not::not")]
    pub requires_api_key: bool,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: message.into(),
            error_kind: kind,
            error_code: code,
            requires_api_key: false,
        }
    }
}
