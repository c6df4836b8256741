use std::future::Future;

use tokio::sync::watch;

/// One-shot termination signal.
///
/// Once triggered it stays triggered; triggering again is a no-op.
/// Any number of waiters can await it, before or after it fires.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
        }
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn shutdown(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_terminated(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|fired| *fired).await;
        }
    }
}
