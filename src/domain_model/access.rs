use crate::domain_model::UserId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Owner,
    Public,
    Private,
    None,
}

impl AccessLevel {
    /// PRIVATE and NONE are kept apart internally but look the same from outside.
    pub fn is_visible(self) -> bool {
        matches!(self, AccessLevel::Owner | AccessLevel::Public)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Owner => "owner",
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
            AccessLevel::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessResolution {
    pub level: AccessLevel,
    pub target_user_id: Option<UserId>,
}

impl AccessResolution {
    pub fn none() -> Self {
        Self {
            level: AccessLevel::None,
            target_user_id: None,
        }
    }
}
