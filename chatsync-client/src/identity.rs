//! Identity context: who is syncing, and with which credential.
//!
//! Supplied by the host's login flow and passed explicitly into the
//! controller; nothing in the client reads ambient storage.

use std::fmt;

use chatsync_core::{UserId, UserInfo};

/// Bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user: UserInfo,
    credential: Credential,
}

impl Identity {
    pub fn new(user: UserInfo, credential: Credential) -> Self {
        Self { user, credential }
    }

    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacted() {
        let identity = Identity::new(UserInfo::new(1, "alice"), Credential::new("s3cret"));
        let printed = format!("{identity:?}");
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("alice"));
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(Credential::new("abc").bearer(), "Bearer abc");
        assert_eq!(Credential::new("abc").token(), "abc");
    }
}
