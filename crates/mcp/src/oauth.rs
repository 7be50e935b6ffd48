//! OAuth handshake channel for http-transport MCP servers.
//!
//! A process-global single-producer/single-consumer queue of `(code, state)`
//! pairs. The gateway's `/mcp/oauth/callback` handler is the producer; an
//! `HttpTransport` performing an interactive `oauth`/`oauth_browser` connect
//! is the consumer. At most one transport may be waiting at a time — the
//! `bootstrap_lock` below serializes concurrent OAuth connects so a second
//! caller waits for the first to finish rather than racing on the queue.

use tokio::sync::{mpsc, Mutex};

/// An authorization code delivered via the OAuth redirect callback.
#[derive(Debug, Clone)]
pub struct AuthCode {
    pub code: String,
    pub state: String,
}

/// The process-global handshake channel.
pub struct OAuthChannel {
    tx: mpsc::Sender<AuthCode>,
    rx: Mutex<mpsc::Receiver<AuthCode>>,
    /// Held for the duration of one interactive OAuth connect; a second
    /// concurrent attempt blocks here instead of enqueuing a competing wait
    /// on `rx`.
    bootstrap_lock: Mutex<()>,
}

impl OAuthChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
            bootstrap_lock: Mutex::new(()),
        }
    }

    /// Called by the HTTP callback handler when the identity provider
    /// redirects back with `code`/`state` query parameters.
    pub async fn deliver(&self, code: String, state: String) {
        // Best-effort: if nobody is waiting (e.g. a stale/replayed
        // callback), the send simply has no consumer and is dropped.
        let _ = self.tx.send(AuthCode { code, state }).await;
    }

    /// Wait for the next authorization code. Serializes against concurrent
    /// callers via `bootstrap_lock` so only one transport is ever parked on
    /// the queue at a time.
    pub async fn wait_for_code(&self) -> Option<AuthCode> {
        let _guard = self.bootstrap_lock.lock().await;
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

impl Default for OAuthChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_code_to_waiter() {
        let chan = Arc::new(OAuthChannel::new());
        let waiter = {
            let chan = chan.clone();
            tokio::spawn(async move { chan.wait_for_code().await })
        };
        // give the waiter a chance to park before delivering
        tokio::task::yield_now().await;
        chan.deliver("abc123".into(), "xyz".into()).await;
        let got = waiter.await.unwrap().expect("expected a code");
        assert_eq!(got.code, "abc123");
        assert_eq!(got.state, "xyz");
    }

    #[tokio::test]
    async fn serializes_concurrent_bootstraps() {
        let chan = Arc::new(OAuthChannel::new());

        let first = {
            let chan = chan.clone();
            tokio::spawn(async move { chan.wait_for_code().await })
        };
        tokio::task::yield_now().await;
        chan.deliver("first".into(), "s1".into()).await;
        assert_eq!(first.await.unwrap().unwrap().code, "first");

        // The lock is released once the first waiter returns; a second
        // bootstrap can now proceed without deadlocking.
        let second = {
            let chan = chan.clone();
            tokio::spawn(async move { chan.wait_for_code().await })
        };
        tokio::task::yield_now().await;
        chan.deliver("second".into(), "s2".into()).await;
        assert_eq!(second.await.unwrap().unwrap().code, "second");
    }
}
