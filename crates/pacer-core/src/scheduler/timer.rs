use std::time::Duration;

use tokio::sync::mpsc::WeakSender;
use tokio::task::JoinHandle;

/// One re-armable delayed event.
///
/// Each arm bumps the generation; a fired event carries the generation it
/// was armed with and is accepted only if it still matches, so an event that
/// was already queued when its timer got cancelled or replaced is ignored.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub(crate) fn arm<E, F>(&mut self, delay: Duration, events: &WeakSender<E>, make: F)
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let events = events.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(make(generation)).await;
            }
        }));
    }

    pub(crate) fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Consume a fired event. False for stale generations.
    pub(crate) fn accept(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_with_current_generation() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut slot = TimerSlot::default();
        slot.arm(Duration::from_secs(1), &tx.downgrade(), |g| g);
        assert!(slot.is_armed());

        let generation = rx.recv().await.unwrap();
        assert!(slot.accept(generation));
        assert!(!slot.is_armed());
        assert!(!slot.accept(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_discards_the_old_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut slot = TimerSlot::default();
        slot.arm(Duration::from_secs(1), &tx.downgrade(), |g| g);
        slot.arm(Duration::from_secs(5), &tx.downgrade(), |g| g);

        let generation = rx.recv().await.unwrap();
        assert!(slot.accept(generation));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_generation_is_rejected() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut slot = TimerSlot::default();
        slot.arm(Duration::ZERO, &tx.downgrade(), |g| g);
        let generation = rx.recv().await.unwrap();
        slot.cancel();
        assert!(!slot.accept(generation));
    }
}
