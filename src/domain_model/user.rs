use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub uuid::Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(UserId)
    }
}

/// How a profile is addressed from a URL: either its internal id or the
/// public short-code printed on shareable links.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfileIdentifier {
    Id(UserId),
    ShortCode(String),
}

impl ProfileIdentifier {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<UserId>() {
            Ok(id) => Some(ProfileIdentifier::Id(id)),
            Err(_) => Some(ProfileIdentifier::ShortCode(trimmed.to_owned())),
        }
    }
}

impl fmt::Display for ProfileIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileIdentifier::Id(id) => write!(f, "{}", id),
            ProfileIdentifier::ShortCode(code) => write!(f, "{}", code),
        }
    }
}
