use crate::domain_model::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Authoritative clock for refresh scheduling.
    pub expires_at: i64,
    pub subject_id: UserId,
}

impl Session {
    pub fn seconds_remaining(&self, now_epoch_secs: i64) -> i64 {
        self.expires_at - now_epoch_secs
    }

    pub fn is_expired(&self, now_epoch_secs: i64) -> bool {
        self.seconds_remaining(now_epoch_secs) < 0
    }
}

// Tokens never end up in logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("subject_id", &self.subject_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    InitialSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: i64) -> Session {
        Session {
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
            expires_at,
            subject_id: UserId(uuid::Uuid::nil()),
        }
    }

    #[test]
    fn remaining_time_goes_negative_after_expiry() {
        let s = session(1_000);
        assert_eq!(s.seconds_remaining(700), 300);
        assert!(!s.is_expired(1_000));
        assert!(s.is_expired(1_001));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", session(1));
        assert!(!rendered.contains("secret"));
    }
}
