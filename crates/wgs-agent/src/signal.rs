//! Signal board shared between boot tasks
//!
//! A small register of binary signals. Producers set bits; any number of
//! tasks wait for one or more of them. Bits are only ever set during a boot
//! cycle, so a waiter that starts after a `set` returns immediately.

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// A set of signals, used both as a mask and as a snapshot
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Signals(u32);

impl Signals {
    /// Empty set
    pub const NONE: Signals = Signals(0);
    /// The link has an address
    pub const LINK_UP: Signals = Signals(1 << 0);
    /// The link supervisor gave up
    pub const LINK_FAILED: Signals = Signals(1 << 1);

    /// Raw bits
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every signal in `other` is present
    pub fn contains(self, other: Signals) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any signal in `other` is present
    pub fn intersects(self, other: Signals) -> bool {
        self.0 & other.0 != 0
    }

    /// Signals present in both sets
    pub fn intersection(self, other: Signals) -> Signals {
        Signals(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Signals {
    type Output = Signals;

    fn bitor(self, rhs: Signals) -> Signals {
        Signals(self.0 | rhs.0)
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Signals::LINK_UP) {
            names.push("LINK_UP");
        }
        if self.contains(Signals::LINK_FAILED) {
            names.push("LINK_FAILED");
        }
        let known = Signals::LINK_UP | Signals::LINK_FAILED;
        let unknown = self.0 & !known.0;
        if unknown != 0 {
            return write!(f, "Signals({} | {:#x})", names.join(" | "), unknown);
        }
        write!(f, "Signals({})", names.join(" | "))
    }
}

/// Errors from waiting on the board
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    /// The board was dropped before any awaited signal was set
    #[error("Signal board is gone")]
    Closed,
}

/// Process-wide signal register
pub struct SignalBoard {
    tx: watch::Sender<Signals>,
}

impl SignalBoard {
    /// Create a board with every signal cleared
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Signals::NONE);
        Self { tx }
    }

    /// Set `signals`; returns `true` if any of them was not already set
    pub fn set(&self, signals: Signals) -> bool {
        self.tx.send_if_modified(|current| {
            let next = *current | signals;
            if next == *current {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    /// Signals currently set
    pub fn snapshot(&self) -> Signals {
        *self.tx.borrow()
    }

    /// Detached waiter handle; it observes the board's closure if the board is
    /// dropped
    pub fn subscribe(&self) -> SignalWatcher {
        SignalWatcher {
            rx: self.tx.subscribe(),
        }
    }

    /// Wait until any of `signals` is set or `timeout` elapses (`None` waits
    /// forever). Returns the requested signals that were set at wake time,
    /// which is empty on timeout.
    pub async fn wait_any(&self, signals: Signals, timeout: Option<Duration>) -> Signals {
        // The board outlives this call, so the watcher cannot observe closure
        self.subscribe()
            .wait_any(signals, timeout)
            .await
            .unwrap_or(Signals::NONE)
    }
}

impl Default for SignalBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting side of a [`SignalBoard`]
#[derive(Clone)]
pub struct SignalWatcher {
    rx: watch::Receiver<Signals>,
}

impl SignalWatcher {
    /// Signals currently set (the last value if the board is gone)
    pub fn snapshot(&self) -> Signals {
        *self.rx.borrow()
    }

    /// Wait until any of `signals` is set or `timeout` elapses (`None` waits
    /// forever). Returns the requested signals set at wake time.
    ///
    /// Fails with [`SignalError::Closed`] if the board is dropped while none
    /// of the requested signals is set.
    pub async fn wait_any(
        &mut self,
        signals: Signals,
        timeout: Option<Duration>,
    ) -> Result<Signals, SignalError> {
        let wait = async {
            match self.rx.wait_for(|current| current.intersects(signals)).await {
                Ok(current) => Ok(current.intersection(signals)),
                Err(_) => Err(SignalError::Closed),
            }
        };

        let Some(limit) = timeout else {
            return wait.await;
        };
        let outcome = tokio::time::timeout(limit, wait).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Ok(self.snapshot().intersection(signals)),
        }
    }
}
