use crate::bus::{Event, Handler, Registry, remove_handler};
use parking_lot::RwLock;
use std::sync::Weak;

/// Handle for removing a listener registered with
/// [`EventBus::subscribe`](crate::EventBus::subscribe).
///
/// The handle targets exactly one listener on exactly one channel. It holds
/// the channel registry weakly: an outstanding handle neither keeps a
/// dropped bus alive nor fails once the bus is gone.
///
/// Dropping the handle does NOT unsubscribe; the bus references listeners
/// without owning their lifetimes, so callers unsubscribe explicitly.
#[must_use = "dropping a Subscription does not unsubscribe; call `unsubscribe` when done"]
pub struct Subscription {
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    pub(crate) fn for_handler<T: Event>(
        channels: Weak<RwLock<Registry>>,
        handler: Handler<T>,
    ) -> Self {
        Self {
            cancel: Box::new(move || {
                if let Some(channels) = channels.upgrade() {
                    remove_handler(&channels, &handler);
                }
            }),
        }
    }

    /// Removes the listener this handle was created for.
    ///
    /// Safe to call more than once; every call after the first is a no-op.
    pub fn unsubscribe(&self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
