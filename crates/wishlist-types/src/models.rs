use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a friendship request while it is still stored.
///
/// Accepted and cancelled requests are deleted, so only these two states
/// ever reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipRequestStatus {
    Pending,
    Rejected,
}

impl FriendshipRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FriendshipRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown friendship request status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for FriendshipRequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_text() {
        for status in [FriendshipRequestStatus::Pending, FriendshipRequestStatus::Rejected] {
            assert_eq!(status.as_str().parse::<FriendshipRequestStatus>(), Ok(status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "accepted".parse::<FriendshipRequestStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("accepted".into()));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&FriendshipRequestStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }
}
