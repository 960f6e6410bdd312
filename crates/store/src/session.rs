//! Identity and CSRF boundary.
//!
//! The surrounding web layer owns login, cookies and token issuance; the
//! pipeline only sees an explicit [`SessionContext`] passed into each
//! operation. Every mutating operation calls [`SessionContext::authorize`]
//! before touching any entity.

use std::fmt::Write as _;

use rand::RngCore;

use kasuwa_core::UserId;

use crate::error::StoreError;

/// An authenticated user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
}

/// A per-session anti-forgery token.
///
/// Issued once per session; mutating requests must present it back and it
/// is compared in constant time.
#[derive(Debug, Clone)]
pub struct CsrfToken(String);

impl CsrfToken {
    const TOKEN_BYTES: usize = 32;

    /// Issue a fresh random token.
    #[must_use]
    pub fn issue() -> Self {
        let mut bytes = [0_u8; Self::TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let mut token = String::with_capacity(Self::TOKEN_BYTES * 2);
        for byte in bytes {
            let _ = write!(token, "{byte:02x}");
        }
        Self(token)
    }

    /// The token value to embed in forms.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a presented token.
    #[must_use]
    pub fn verify(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        let mut diff = 0_u8;
        for (a, b) in expected.iter().zip(presented) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

/// The request-scoped session state handed in by the web layer.
#[derive(Debug, Clone)]
pub struct SessionContext {
    identity: Option<Identity>,
    csrf: CsrfToken,
}

impl SessionContext {
    /// A session with no logged-in user.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            csrf: CsrfToken::issue(),
        }
    }

    /// A session for a logged-in user.
    #[must_use]
    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            identity: Some(Identity { user_id }),
            csrf: CsrfToken::issue(),
        }
    }

    /// The session's CSRF token, for form rendering.
    #[must_use]
    pub fn csrf_token(&self) -> &str {
        self.csrf.as_str()
    }

    /// Require an authenticated identity (read-only operations).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` if no user is logged in.
    pub fn identity(&self) -> Result<Identity, StoreError> {
        self.identity.ok_or(StoreError::Unauthorized)
    }

    /// Require an authenticated identity and a matching CSRF token
    /// (mutating operations).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` if no user is logged in, or
    /// `StoreError::Forbidden` if the presented token does not match.
    pub fn authorize(&self, presented_csrf: &str) -> Result<Identity, StoreError> {
        let identity = self.identity()?;
        if !self.csrf.verify(presented_csrf) {
            return Err(StoreError::Forbidden);
        }
        Ok(identity)
    }
}
