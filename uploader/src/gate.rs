//! Password gate in front of the upload form.

use subtle::ConstantTimeEq;

/// Decides whether a candidate password unlocks the form.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, candidate: &str) -> bool;
}

/// Checks candidates against a configured secret without leaking where they differ.
pub struct SecretPassword {
    secret: Box<[u8]>,
}

impl SecretPassword {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes().into_boxed_slice(),
        }
    }
}

impl std::fmt::Debug for SecretPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretPassword").finish_non_exhaustive()
    }
}

impl PasswordVerifier for SecretPassword {
    fn verify(&self, candidate: &str) -> bool {
        // ct_eq on slices of different lengths is false without comparing contents
        bool::from(self.secret.ct_eq(candidate.as_bytes()))
    }
}

/// Per-run session context. Whoever drives the form owns one; there is no global state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    authenticated: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn sign_out(&mut self) {
        self.authenticated = false;
    }
}
