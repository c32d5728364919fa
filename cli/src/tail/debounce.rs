//! Search input debouncing

use super::schedule::TaskSlot;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Delivers only the last value typed within the debounce window.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    slot: TaskSlot,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: TaskSlot::new(),
        }
    }

    /// Send `value` through `tx` once no newer input arrives for the delay.
    pub fn input<T: Send + 'static>(&mut self, value: T, tx: UnboundedSender<T>) {
        self.slot.schedule(self.delay, move || {
            let _ = tx.send(value);
        });
    }

    pub fn cancel(&mut self) {
        self.slot.cancel();
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_only_last_input_is_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::default();

        debouncer.input("u".to_string(), tx.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.input("us".to_string(), tx.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.input("users".to_string(), tx.clone());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().unwrap(), "users");
        assert!(rx.try_recv().is_err());
    }
}
