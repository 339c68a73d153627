//! Core traits for PULSE protocol.
//!
//! The server consults a [`CredentialValidator`] for every authentication
//! attempt; it treats the validator as an opaque predicate.

/// Decides whether a username/password pair may open a session.
///
/// Any `Fn(&str, &str) -> bool` closure that is `Send + Sync` is a validator,
/// which makes test doubles a one-liner:
///
/// ```
/// use pulse_protocol::core::CredentialValidator;
///
/// let only_alice = |user: &str, _pass: &str| user == "alice";
/// assert!(only_alice.validate("alice", "secret"));
/// assert!(!only_alice.validate("mallory", "secret"));
/// ```
pub trait CredentialValidator: Send + Sync + 'static {
    /// Returns `true` if the credentials are accepted.
    fn validate(&self, username: &str, password: &str) -> bool;
}

impl<F> CredentialValidator for F
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    fn validate(&self, username: &str, password: &str) -> bool {
        self(username, password)
    }
}

/// Accepts any pair where both fields are non-empty.
///
/// Stand-in for a real credential store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyCredentials;

impl CredentialValidator for NonEmptyCredentials {
    fn validate(&self, username: &str, password: &str) -> bool {
        !username.is_empty() && !password.is_empty()
    }
}
