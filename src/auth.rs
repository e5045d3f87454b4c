use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};

/// Bearer token shared by every client of one user session.
///
/// Clones share the same slot, so a refreshed token is picked up by both RPC
/// clients without rebuilding them.
#[derive(Clone, Default)]
pub struct Credential {
    token: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("present", &self.is_present())
            .finish()
    }
}

impl Credential {
    pub fn new(token: Option<String>) -> Self {
        let cred = Self::default();
        if let Some(token) = token {
            cred.set(token);
        }
        cred
    }

    /// Blank tokens count as absent.
    pub fn set(&self, token: String) {
        let token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_present(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `Authorization` header value, or `AuthError` before anything is sent.
    pub fn bearer(&self) -> Result<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| format!("Bearer {t}"))
            .ok_or_else(|| Error::Auth("no credential available; sign in first".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_an_auth_error() {
        let cred = Credential::new(None);
        assert!(matches!(cred.bearer(), Err(Error::Auth(_))));
        cred.set("   ".into());
        assert!(!cred.is_present());
    }

    #[test]
    fn clones_share_refreshed_token() {
        let cred = Credential::new(Some("old".into()));
        let other = cred.clone();
        cred.set("new".into());
        assert_eq!(other.bearer().unwrap(), "Bearer new");
        other.clear();
        assert!(cred.bearer().is_err());
    }

    #[test]
    fn debug_does_not_print_token() {
        let cred = Credential::new(Some("secret-token".into()));
        assert!(!format!("{cred:?}").contains("secret"));
    }
}
