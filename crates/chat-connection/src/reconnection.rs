//! Reconnect timer.
//!
//! At most one reconnect is ever pending: scheduling a new one cancels the
//! previous timer first.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
pub(crate) struct ReconnectTimer {
    pending: Option<CancellationToken>,
}

impl ReconnectTimer {
    /// Runs `fire` after `delay` unless cancelled first.
    pub(crate) fn schedule<F>(&mut self, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.cancel() {
            debug!("replacing pending reconnect timer");
        }

        let token = CancellationToken::new();
        let armed = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = armed.cancelled() => {}
                _ = tokio::time::sleep(delay) => fire(),
            }
        });
        self.pending = Some(token);
    }

    /// Cancels the pending timer. Returns `true` if one was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(token) => {
                let armed = !token.is_cancelled();
                token.cancel();
                armed
            }
            None => false,
        }
    }

    /// Forgets a timer that has already fired.
    pub(crate) fn clear(&mut self) {
        self.pending = None;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
