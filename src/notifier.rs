use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc, Mutex,
};

/// Fan-out of events to any number of channel receivers.
#[derive(Clone)]
pub(crate) struct Notifier<Event: Send + Clone + 'static> {
    senders: Arc<Mutex<Vec<Sender<Event>>>>,
}

impl<Event: Send + Clone + 'static> Notifier<Event> {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Delivers `event` to every live receiver, dropping senders whose
    /// receiver has gone away.
    pub fn notify(&self, event: Event) {
        match self.senders.lock() {
            Ok(mut senders) => senders.retain(|tx| tx.send(event.clone()).is_ok()),
            Err(_) => log::warn!("Notifier lock poisoned, event dropped"),
        }
    }

    pub fn observer(&self) -> Receiver<Event> {
        let (tx, rx) = channel();
        match self.senders.lock() {
            Ok(mut senders) => senders.push(tx),
            Err(_) => log::warn!("Notifier lock poisoned, observer will receive nothing"),
        }
        rx
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::Notifier;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_multiple_observers() {
        let notifier = Notifier::<i32>::new();
        let rx1 = notifier.observer();
        let rx2 = notifier.observer();

        notifier.notify(42);

        assert_eq!(rx1.recv_timeout(Duration::from_millis(100)).unwrap(), 42);
        assert_eq!(rx2.recv_timeout(Duration::from_millis(100)).unwrap(), 42);
    }

    #[test]
    fn test_dead_channel_cleanup() {
        let notifier = Notifier::<String>::new();
        {
            let _rx1 = notifier.observer();
            let _rx2 = notifier.observer();
        }
        let rx_live = notifier.observer();
        assert_eq!(notifier.observer_count(), 3);

        notifier.notify("cleanup_test".to_string());

        assert_eq!(notifier.observer_count(), 1);
        let received = rx_live.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, "cleanup_test");
    }

    #[test]
    fn test_no_observers() {
        let notifier = Notifier::<String>::new();
        notifier.notify("no_observers".to_string());
    }

    #[test]
    fn test_concurrent_notifications() {
        let notifier = Arc::new(Notifier::<i32>::new());
        let rx = notifier.observer();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let notifier_clone = notifier.clone();
                std::thread::spawn(move || {
                    notifier_clone.notify(i);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut received: Vec<i32> = rx.try_iter().collect();
        received.sort();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_clone_notifier() {
        let notifier1 = Notifier::<String>::new();
        let notifier2 = notifier1.clone();
        let rx = notifier2.observer();

        notifier1.notify("shared".to_string());

        assert_eq!(rx.recv_timeout(Duration::from_millis(100)).unwrap(), "shared");
    }
}
