//! Access to the bearer token sent in the STOMP CONNECT frame.
//!
//! The manager reads the token once per attempt and never stores it.

/// Synchronous source of the current auth token.
///
/// Returning `None` (or an empty string) fails `connect()` with
/// [`ConnectError::Unauthenticated`](crate::ConnectError::Unauthenticated).
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}
