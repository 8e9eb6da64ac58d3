use crate::error::EventBusError;
use crate::subscription::Subscription;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, trace, warn};

/// A safe default for stream buffers.
/// 128 is usually enough for the domain events of a chat session.
const DEFAULT_STREAM_CAPACITY: usize = 128;
const MIN_CAPACITY: usize = 1;

/// Marker trait for types that can be dispatched through the [`EventBus`].
///
/// Any type that is `Send + Sync + 'static` automatically implements this
/// trait. The event type doubles as the channel identifier: publishers and
/// subscribers of a channel agree on the payload shape by construction.
pub trait Event: Any + Send + Sync + 'static {}
impl<T: Any + Send + Sync + 'static> Event for T {}

/// A listener callback registered against a single channel.
///
/// Listener identity is `Arc` identity: registering the same `Arc` twice on
/// one channel keeps a single entry, and [`EventBus::unsubscribe`] removes
/// exactly the `Arc` it is given.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) type Registry = FxHashMap<TypeId, Box<dyn Any + Send + Sync>>;

struct StreamState<T> {
    capacity: usize,
    sender: broadcast::Sender<Arc<T>>,
}

/// Per-channel state: synchronous listeners plus an optional event stream.
struct ListenerSet<T> {
    handlers: Vec<Handler<T>>,
    stream: Option<StreamState<T>>,
}

impl<T: Event> ListenerSet<T> {
    const fn empty() -> Self {
        Self { handlers: Vec::new(), stream: None }
    }

    fn contains(&self, handler: &Handler<T>) -> bool {
        self.handlers.iter().any(|registered| Arc::ptr_eq(registered, handler))
    }

    fn is_vacant(&self) -> bool {
        self.handlers.is_empty()
            && self.stream.as_ref().map_or(true, |stream| stream.sender.receiver_count() == 0)
    }
}

/// A thread-safe, in-process pub/sub event bus.
///
/// Channels are indexed by the [`TypeId`] of the event. Cloning the bus is
/// cheap and clones share one channel registry.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    channels: Arc<RwLock<Registry>>,
}

impl EventBus {
    /// Creates a new, empty `EventBus`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for events of type `T`.
    ///
    /// The channel's listener set is created lazily on first subscription.
    /// The listener runs inline on the publishing thread, so it should
    /// return quickly.
    ///
    /// The returned [`Subscription`] removes exactly this listener; calling
    /// [`Subscription::unsubscribe`] more than once is safe. Dropping the
    /// handle does NOT unsubscribe.
    ///
    /// # Examples
    /// ```rust
    /// use chatd_event_bus::EventBus;
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// struct MessageReceived { body: String }
    ///
    /// let bus = EventBus::new();
    /// let seen = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&seen);
    /// let subscription = bus.subscribe(move |_event: &MessageReceived| {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    /// });
    ///
    /// bus.publish(MessageReceived { body: "hi".into() });
    /// assert_eq!(seen.load(Ordering::SeqCst), 1);
    ///
    /// subscription.unsubscribe();
    /// bus.publish(MessageReceived { body: "bye".into() });
    /// assert_eq!(seen.load(Ordering::SeqCst), 1);
    /// ```
    pub fn subscribe<T, F>(&self, listener: F) -> Subscription
    where
        T: Event,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler: Handler<T> = Arc::new(listener);
        self.subscribe_arc(handler)
    }

    /// Registers a shared listener for events of type `T` without re-wrapping.
    ///
    /// Subscribing an `Arc` that is already registered on this channel is an
    /// idempotent no-op: the existing registration is reused and the listener
    /// still fires once per publish.
    ///
    /// # Examples
    /// ```rust
    /// use chatd_event_bus::{EventBus, Handler};
    /// use std::sync::Arc;
    ///
    /// let bus = EventBus::new();
    /// let handler: Handler<u32> = Arc::new(|_event| {});
    ///
    /// let _first = bus.subscribe_arc(Arc::clone(&handler));
    /// let _second = bus.subscribe_arc(handler);
    /// assert_eq!(bus.listener_count::<u32>(), 1);
    /// ```
    pub fn subscribe_arc<T: Event>(&self, handler: Handler<T>) -> Subscription {
        let id = TypeId::of::<T>();
        {
            let mut channels = self.channels.write();
            let entry = channels.entry(id).or_insert_with(|| {
                trace!(event = std::any::type_name::<T>(), "Initializing new event channel");
                Box::new(ListenerSet::<T>::empty())
            });
            match entry.downcast_mut::<ListenerSet<T>>() {
                Some(set) => {
                    if set.contains(&handler) {
                        trace!(
                            event = std::any::type_name::<T>(),
                            "Listener already registered, reusing the existing entry"
                        );
                    } else {
                        set.handlers.push(Arc::clone(&handler));
                        trace!(
                            event = std::any::type_name::<T>(),
                            listeners = set.handlers.len(),
                            "Listener registered"
                        );
                    }
                },
                None => {
                    warn!(
                        event = std::any::type_name::<T>(),
                        "Listener set had an unexpected type, reinitializing the channel"
                    );
                    let mut set = ListenerSet::<T>::empty();
                    set.handlers.push(Arc::clone(&handler));
                    *entry = Box::new(set);
                },
            }
        }
        Subscription::for_handler(Arc::downgrade(&self.channels), handler)
    }

    /// Removes a listener from the channel for `T`.
    ///
    /// Returns whether the listener was registered. Unsubscribing an unknown
    /// listener, or from a channel that was never subscribed, is a no-op.
    /// Once the channel holds no listeners and no live stream, its registry
    /// entry is dropped.
    pub fn unsubscribe<T: Event>(&self, handler: &Handler<T>) -> bool {
        remove_handler(&self.channels, handler)
    }

    /// Publishes an event to every listener of its channel.
    ///
    /// The set of listeners is captured once, before the first invocation:
    /// listeners added from inside a listener are not called this round, and
    /// listeners removed from inside a listener are still called this round.
    /// Invocation order is unspecified and no caller may depend on it.
    ///
    /// Each invocation is isolated: a panicking listener is reported through
    /// `tracing` and the remaining listeners still run. The payload is then
    /// forwarded to the channel's event stream, if one is open.
    ///
    /// Returns the number of receivers notified. Publishing to a channel with
    /// no listeners is a no-op.
    ///
    /// # Examples
    /// ```rust
    /// use chatd_event_bus::EventBus;
    ///
    /// #[derive(Clone, Debug)]
    /// struct SessionClosed { id: u64 }
    ///
    /// let bus = EventBus::new();
    /// // Nobody listens yet, the event is dropped.
    /// assert_eq!(bus.publish(SessionClosed { id: 7 }), 0);
    /// ```
    pub fn publish<T: Event>(&self, event: T) -> usize {
        self.publish_arc(Arc::new(event))
    }

    /// Publishes a shared event instance without re-wrapping.
    ///
    /// Dispatch semantics are those of [`EventBus::publish`].
    pub fn publish_arc<T: Event>(&self, event: Arc<T>) -> usize {
        let id = TypeId::of::<T>();
        let (snapshot, stream) = {
            let channels = self.channels.read();
            let Some(entry) = channels.get(&id) else {
                trace!(event = std::any::type_name::<T>(), "Event dropped: no listeners");
                return 0;
            };
            match entry.downcast_ref::<ListenerSet<T>>() {
                Some(set) => {
                    (set.handlers.clone(), set.stream.as_ref().map(|s| s.sender.clone()))
                },
                None => {
                    warn!(
                        event = std::any::type_name::<T>(),
                        "Listener set had an unexpected type, dropping event"
                    );
                    return 0;
                },
            }
        };

        let mut notified = snapshot.len();
        for handler in &snapshot {
            if let Err(reason) = panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                error!(
                    event = std::any::type_name::<T>(),
                    panic = panic_message(reason.as_ref()),
                    "Listener panicked during dispatch, continuing with the remaining listeners"
                );
            }
        }

        if let Some(sender) = stream {
            match sender.send(event) {
                Ok(count) => notified += count,
                Err(_) => {
                    trace!(
                        event = std::any::type_name::<T>(),
                        "Stream forward skipped: no active receivers"
                    );
                },
            }
        }

        trace!(event = std::any::type_name::<T>(), notified, "Event dispatched");
        notified
    }

    /// Opens an event stream for `T` with the default buffer capacity.
    ///
    /// Streams are the asynchronous consumption mode: every publish forwards
    /// the payload as an `Arc<T>` to all stream receivers, without waiting
    /// for them. Delivery is best-effort; a lagging receiver skips to the
    /// fresh tail of the buffer (see [`EventReceiverExt`]).
    ///
    /// # Errors
    /// Returns [`EventBusError::TypeMismatch`] if the channel's listener set
    /// failed an internal downcast.
    ///
    /// # Examples
    /// ```rust
    /// use chatd_event_bus::{EventBus, EventReceiverExt};
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// struct Tick(u64);
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), chatd_event_bus::EventBusError> {
    /// let bus = EventBus::new();
    /// let mut rx = bus.stream::<Tick>()?;
    /// bus.publish(Tick(1));
    /// assert_eq!(rx.next_event().await.as_deref(), Some(&Tick(1)));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`EventReceiverExt`]: crate::EventReceiverExt
    pub fn stream<T: Event>(&self) -> Result<broadcast::Receiver<Arc<T>>, EventBusError> {
        self.stream_with_capacity(DEFAULT_STREAM_CAPACITY)
    }

    /// Opens an event stream for `T` with a specific buffer capacity.
    ///
    /// The capacity is fixed when the channel's stream is first opened;
    /// attaching again with a different capacity keeps the original buffer.
    ///
    /// # Errors
    /// Returns [`EventBusError::InvalidCapacity`] if `capacity` is zero, or
    /// [`EventBusError::TypeMismatch`] if the channel's listener set failed
    /// an internal downcast.
    pub fn stream_with_capacity<T: Event>(
        &self,
        capacity: usize,
    ) -> Result<broadcast::Receiver<Arc<T>>, EventBusError> {
        let capacity = validate_capacity(capacity)?;
        let id = TypeId::of::<T>();
        let mut channels = self.channels.write();
        let entry = channels.entry(id).or_insert_with(|| {
            trace!(event = std::any::type_name::<T>(), "Initializing new event channel");
            Box::new(ListenerSet::<T>::empty())
        });
        let set = entry.downcast_mut::<ListenerSet<T>>().ok_or_else(|| {
            EventBusError::TypeMismatch {
                message: std::any::type_name::<T>().into(),
                context: Some("Unexpected listener set type".into()),
            }
        })?;

        match &set.stream {
            Some(stream) => {
                if stream.capacity != capacity {
                    warn!(
                        event = std::any::type_name::<T>(),
                        existing_capacity = stream.capacity,
                        requested_capacity = capacity,
                        "Event stream already open with a different capacity"
                    );
                }
                Ok(stream.sender.subscribe())
            },
            None => {
                trace!(event = std::any::type_name::<T>(), capacity, "Opening event stream");
                let (sender, receiver) = broadcast::channel::<Arc<T>>(capacity);
                set.stream = Some(StreamState { capacity, sender });
                Ok(receiver)
            },
        }
    }

    /// Drops the channel for `T`: all listeners and its event stream.
    ///
    /// Subsequent publishes to the channel are no-ops until someone
    /// re-subscribes. Stream receivers observe closure. Returns whether the
    /// channel existed.
    pub fn clear<T: Event>(&self) -> bool {
        let removed = self.channels.write().remove(&TypeId::of::<T>()).is_some();
        if removed {
            trace!(event = std::any::type_name::<T>(), "Channel cleared");
        }
        removed
    }

    /// Drops every channel, returning how many were cleared.
    ///
    /// The bus itself stays usable; this is the lifecycle reset.
    pub fn clear_all(&self) -> usize {
        let mut channels = self.channels.write();
        let count = channels.len();
        channels.clear();
        count
    }

    /// Number of listeners currently registered for `T` (0 for unknown
    /// channels). Stream receivers are not counted.
    #[must_use]
    pub fn listener_count<T: Event>(&self) -> usize {
        let channels = self.channels.read();
        channels
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<ListenerSet<T>>())
            .map_or(0, |set| set.handlers.len())
    }
}

/// Removes `handler` from the channel for `T`, pruning the channel entry
/// once it is vacant. Shared by [`EventBus::unsubscribe`] and
/// [`Subscription`] handles.
pub(crate) fn remove_handler<T: Event>(
    channels: &RwLock<Registry>,
    handler: &Handler<T>,
) -> bool {
    let id = TypeId::of::<T>();
    let mut channels = channels.write();
    let Some(entry) = channels.get_mut(&id) else {
        return false;
    };
    let Some(set) = entry.downcast_mut::<ListenerSet<T>>() else {
        warn!(
            event = std::any::type_name::<T>(),
            "Listener set had an unexpected type, skipping removal"
        );
        return false;
    };
    let Some(position) = set.handlers.iter().position(|h| Arc::ptr_eq(h, handler)) else {
        return false;
    };
    set.handlers.swap_remove(position);
    trace!(
        event = std::any::type_name::<T>(),
        listeners = set.handlers.len(),
        "Listener removed"
    );
    if set.is_vacant() {
        channels.remove(&id);
        trace!(event = std::any::type_name::<T>(), "Channel pruned");
    }
    true
}

fn panic_message(reason: &(dyn Any + Send)) -> &str {
    reason
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| reason.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

fn validate_capacity(capacity: usize) -> Result<usize, EventBusError> {
    if capacity < MIN_CAPACITY {
        return Err(EventBusError::InvalidCapacity {
            message: format!("capacity must be >= {MIN_CAPACITY}").into(),
            context: None,
        });
    }
    Ok(capacity)
}
