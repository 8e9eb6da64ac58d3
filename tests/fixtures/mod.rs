//! Shared fixtures for the integration suite.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A chat message arrived on some session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageReceived(pub usize);

/// A chat session went away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClosed(pub u64);

/// Thread-safe invocation counter for listener assertions.
#[derive(Clone, Debug, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
