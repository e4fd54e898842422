//! Producer/consumer handoff between the executor's pump loop and the caller.
//!
//! Unbounded FIFO with two close flavors: a plain close yields end-of-stream,
//! an error close drains the buffered items first and then yields the error
//! exactly once. Dropping either side closes the queue, which is how consumer
//! abandonment reaches the producer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::ExecError;

struct State<T> {
    buf: VecDeque<T>,
    error: Option<ExecError>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn close(&self) {
        let mut state = self.state.lock().expect("queue state poisoned");
        state.closed = true;
        drop(state);
        self.notify.notify_one();
    }
}

/// Producer half. Owned by the executor's pump loop.
pub struct EntrySender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half. Single consumer; iteration order is FIFO.
pub struct EntryReceiver<T> {
    shared: Arc<Shared<T>>,
}

pub fn entry_queue<T>() -> (EntrySender<T>, EntryReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: VecDeque::new(),
            error: None,
            closed: false,
        }),
        notify: Notify::new(),
    });
    (
        EntrySender {
            shared: shared.clone(),
        },
        EntryReceiver { shared },
    )
}

impl<T> EntrySender<T> {
    /// Enqueues an item, waking a parked consumer. Fails once the queue is
    /// closed from either side.
    pub fn push(&self, item: T) -> Result<(), ExecError> {
        let mut state = self.shared.state.lock().expect("queue state poisoned");
        if state.closed {
            return Err(ExecError::QueueClosed);
        }
        state.buf.push_back(item);
        drop(state);
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Idempotent. Waiters observe end-of-stream after the buffer drains.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Idempotent; the first error wins. Buffered items drain before the
    /// error is yielded.
    pub fn close_with_error(&self, error: ExecError) {
        let mut state = self.shared.state.lock().expect("queue state poisoned");
        if !state.closed {
            state.closed = true;
            state.error = Some(error);
        }
        drop(state);
        self.shared.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().expect("queue state poisoned").closed
    }
}

impl<T> Drop for EntrySender<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T> EntryReceiver<T> {
    /// Awaits the next item. `None` is end-of-stream; an `Err` item reports
    /// the error close (after all buffered items were delivered) and is
    /// yielded at most once.
    pub async fn next(&mut self) -> Option<Result<T, ExecError>> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.state.lock().expect("queue state poisoned");
                if let Some(item) = state.buf.pop_front() {
                    return Some(Ok(item));
                }
                if let Some(error) = state.error.take() {
                    return Some(Err(error));
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Drains everything currently available without waiting.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let mut state = self.shared.state.lock().expect("queue state poisoned");
        state.buf.drain(..).collect()
    }
}

impl<T> Drop for EntryReceiver<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn items_arrive_in_fifo_order() {
        let (tx, mut rx) = entry_queue();
        for i in 0..5 {
            tx.push(i).unwrap();
        }
        tx.close();

        let mut seen = Vec::new();
        while let Some(item) = rx.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_push_fails_afterwards() {
        let (tx, mut rx) = entry_queue::<u32>();
        tx.close();
        tx.close();
        assert!(matches!(tx.push(1), Err(ExecError::QueueClosed)));
        assert!(rx.next().await.is_none());
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn error_close_drains_buffered_items_first() {
        let (tx, mut rx) = entry_queue();
        tx.push("a").unwrap();
        tx.push("b").unwrap();
        tx.close_with_error(ExecError::transport("stdout closed", ""));

        assert_eq!(rx.next().await.unwrap().unwrap(), "a");
        assert_eq!(rx.next().await.unwrap().unwrap(), "b");
        assert!(matches!(
            rx.next().await,
            Some(Err(ExecError::Transport { .. }))
        ));
        // The error is yielded once; afterwards it is a plain end-of-stream.
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn first_close_wins_over_later_error_close() {
        let (tx, mut rx) = entry_queue::<u32>();
        tx.close();
        tx.close_with_error(ExecError::transport("late", ""));
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_receiver_closes_the_queue() {
        let (tx, rx) = entry_queue::<u32>();
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(tx.push(1), Err(ExecError::QueueClosed)));
    }

    #[tokio::test]
    async fn parked_consumer_wakes_on_push() {
        let (tx, mut rx) = entry_queue();
        let consumer = tokio::spawn(async move { rx.next().await });
        tokio::task::yield_now().await;
        tx.push(7u32).unwrap();
        let got = consumer.await.unwrap();
        assert_eq!(got.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn parked_consumer_wakes_on_close() {
        let (tx, mut rx) = entry_queue::<u32>();
        let consumer = tokio::spawn(async move { rx.next().await });
        tokio::task::yield_now().await;
        tx.close();
        assert!(consumer.await.unwrap().is_none());
    }
}
