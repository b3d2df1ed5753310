//! Call-completion signals.
//!
//! The calling bridge reports call endings via the `/api/call-events`
//! webhook. The sequencer registers a waiter for the prospect's phone number
//! after initiating a call; the webhook resolves it. Waiting is always
//! bounded, so a bridge that never reports simply degrades to the timeout.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

/// In-process registry of pending completion waiters, keyed by phone number.
#[derive(Default)]
pub struct CallEvents {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl CallEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every waiter registered for `phone`. Returns how many were woken.
    pub fn resolve(&self, phone: &str) -> usize {
        let mut waiters = self.waiters.lock().expect("waiter map lock poisoned");
        match waiters.remove(phone) {
            Some(senders) => senders
                .into_iter()
                .map(|s| s.send(()))
                .filter(Result::is_ok)
                .count(),
            None => 0,
        }
    }

    /// Wait up to `timeout` for a completion event for `phone`.
    /// Returns `true` if the event arrived, `false` on timeout.
    pub async fn wait_for(&self, phone: &str, timeout: Duration) -> bool {
        let rx = {
            let mut waiters = self.waiters.lock().expect("waiter map lock poisoned");
            let entry = waiters.entry(phone.to_string()).or_default();
            entry.retain(|s| !s.is_closed());
            let (tx, rx) = oneshot::channel();
            entry.push(tx);
            rx
        };
        tokio::time::timeout(timeout, rx).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn resolving_with_no_waiters_is_harmless() {
        let events = CallEvents::new();
        assert_eq!(events.resolve("+15550000000"), 0);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_matching_event() {
        let events = Arc::new(CallEvents::new());
        let waiter = {
            let events = Arc::clone(&events);
            tokio::spawn(async move {
                events
                    .wait_for("+15551230001", Duration::from_secs(5))
                    .await
            })
        };
        // Let the waiter register before resolving.
        tokio::task::yield_now().await;
        while events.resolve("+15551230001") == 0 {
            tokio::task::yield_now().await;
        }
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn event_for_a_different_phone_does_not_wake() {
        let events = Arc::new(CallEvents::new());
        let waiter = {
            let events = Arc::clone(&events);
            tokio::spawn(async move {
                events
                    .wait_for("+15551230001", Duration::from_millis(50))
                    .await
            })
        };
        tokio::task::yield_now().await;
        events.resolve("+15559999999");
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_an_event() {
        let events = CallEvents::new();
        let arrived = events
            .wait_for("+15551230001", Duration::from_secs(120))
            .await;
        assert!(!arrived);
    }
}
