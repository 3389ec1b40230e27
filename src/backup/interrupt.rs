//! Coarse cancellation on SIGINT and SIGTERM.
//!
//! A signal raises a flag checked between actions. Three signals within one
//! second terminate the process at once.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const HARD_EXIT_SIGNALS: usize = 3;
const HARD_EXIT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    requested: Arc<AtomicBool>,
    received: Arc<Mutex<VecDeque<Instant>>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes process signals to this flag.
    pub fn install(&self) -> Result<()> {
        let interrupt = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Signal received");
            if interrupt.record(Instant::now()) {
                tracing::error!("Hard Exit!!!!");
                std::process::exit(1);
            }
        })
        .map_err(Error::from)
        .add_msg("Unable to install signal handler")
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Raises the flag; true when enough signals came in quick succession
    /// to give up on a graceful stop.
    pub fn record(&self, at: Instant) -> bool {
        self.requested.store(true, Ordering::SeqCst);
        let mut received = self
            .received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        received.push_back(at);
        while received.len() > HARD_EXIT_SIGNALS {
            received.pop_front();
        }
        received.len() >= HARD_EXIT_SIGNALS
            && received
                .front()
                .is_some_and(|first| at.saturating_duration_since(*first) < HARD_EXIT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_signal_only_raises_flag() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_requested());
        assert!(!interrupt.record(Instant::now()));
        assert!(interrupt.is_requested());
        assert!(interrupt.clone().is_requested());
    }

    #[test]
    fn test_three_quick_signals_force_exit() {
        let interrupt = Interrupt::new();
        let start = Instant::now();
        assert!(!interrupt.record(start));
        assert!(!interrupt.record(start + Duration::from_millis(300)));
        assert!(interrupt.record(start + Duration::from_millis(600)));
    }

    #[test]
    fn test_slow_signals_do_not_force_exit() {
        let interrupt = Interrupt::new();
        let start = Instant::now();
        assert!(!interrupt.record(start));
        assert!(!interrupt.record(start + Duration::from_millis(700)));
        assert!(!interrupt.record(start + Duration::from_millis(1400)));
        assert!(!interrupt.record(start + Duration::from_millis(2100)));
        assert!(interrupt.record(start + Duration::from_millis(2200)));
    }
}
