//! Single-slot, latest-wins handoff between the receive loop and a worker.

use tokio::sync::watch;

/// Create a connected mailbox pair.
pub fn mailbox<T: Clone>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = watch::channel(None);
    (MailboxSender { tx }, MailboxReceiver { rx })
}

/// Producer side. Dropping it closes the mailbox.
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> MailboxSender<T> {
    /// Replace whatever is waiting with `value`. Never blocks.
    pub fn put(&self, value: T) {
        // Returns the superseded value, which is dropped unseen
        self.tx.send_replace(Some(value));
    }

    /// Whether the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> MailboxReceiver<T> {
    /// Wait for a value newer than the last one taken.
    ///
    /// Returns `None` once the sender is dropped and nothing unseen is left.
    pub async fn take(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unconsumed_values_are_replaced() {
        let (tx, mut rx) = mailbox();
        for n in 1..=5 {
            tx.put(n);
        }
        assert_eq!(rx.take().await, Some(5));

        tx.put(6);
        assert_eq!(rx.take().await, Some(6));
    }

    #[tokio::test]
    async fn take_waits_for_a_new_value() {
        let (tx, mut rx) = mailbox();
        tx.put(1);
        assert_eq!(rx.take().await, Some(1));

        let pending = tokio::time::timeout(Duration::from_millis(50), rx.take()).await;
        assert!(pending.is_err(), "already-taken value must not be delivered twice");
    }

    #[tokio::test]
    async fn closing_delivers_last_value_then_ends() {
        let (tx, mut rx) = mailbox();
        tx.put("last");
        drop(tx);

        assert_eq!(rx.take().await, Some("last"));
        assert_eq!(rx.take().await, None);
    }

    #[tokio::test]
    async fn slow_consumer_sees_increasing_subsequence_ending_in_latest() {
        let (tx, mut rx) = mailbox();
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(n) = rx.take().await {
                seen.push(n);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            seen
        });

        const N: u32 = 200;
        for n in 0..N {
            tx.put(n);
            tokio::task::yield_now().await;
        }
        drop(tx);

        let seen = consumer.await.unwrap();
        assert_eq!(seen.last(), Some(&(N - 1)));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!((seen.len() as u32) < N);
    }
}
