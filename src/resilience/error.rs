#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("authentication expired")]
    AuthenticationExpired,
    #[error("request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    #[error("network error: {0}")]
    Network(String),
    #[error("service unavailable: circuit is open")]
    CircuitOpen,
    #[error("unauthorized")]
    Unauthorized,
    #[error("status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("invalid request body: {0}")]
    Encode(String),
}

impl DispatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::Http { status: 404, .. })
    }
}
