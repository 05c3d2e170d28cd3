//! Debounced input.
//!
//! Search boxes push every keystroke into a [`Debouncer`]; only the last value
//! is emitted, once the input has been quiet for the configured delay.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Quiet period of the operator keyword search.
pub const ADMIN_SEARCH_DEBOUNCE: Duration = Duration::from_millis(700);
/// Quiet period of the member search boxes.
pub const MEMBER_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

type Slot<T> = Arc<Mutex<Option<(u64, T)>>>;

pub struct Debouncer<T> {
    delay: Duration,
    pending: Slot<T>,
    generation: u64,
    timer: Option<CancellationToken>,
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Returns the debouncer and the stream of settled values.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            pending: Arc::new(Mutex::new(None)),
            generation: 0,
            timer: None,
            tx,
        };
        (debouncer, rx)
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace the pending value and restart the quiet period.
    pub fn push(&mut self, value: T) {
        self.cancel_timer();
        self.generation += 1;
        let generation = self.generation;
        *lock(&self.pending) = Some((generation, value));

        let token = CancellationToken::new();
        self.timer = Some(token.clone());
        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let value = {
                        let mut slot = lock(&pending);
                        match slot.take() {
                            Some((g, value)) if g == generation => Some(value),
                            other => {
                                *slot = other;
                                None
                            }
                        }
                    };
                    if let Some(value) = value {
                        trace!(generation, "Debounced value emitted");
                        let _ = tx.send(value);
                    }
                }
            }
        });
    }

    /// Emit the pending value now, if any.
    pub fn flush(&mut self) -> bool {
        self.cancel_timer();
        let value = lock(&self.pending).take();
        value.is_some_and(|(_, value)| self.tx.send(value).is_ok())
    }

    /// Drop the pending value without emitting it.
    pub fn cancel(&mut self) {
        self.cancel_timer();
        lock(&self.pending).take();
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
