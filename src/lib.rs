//! # chatd Event Bus
//!
//! A typed, thread-safe, in-process pub/sub event bus for chat backend
//! services.
//!
//! ## Overview
//!
//! Provides a central [`EventBus`] connecting decoupled components: request
//! handlers publish domain events ("message received", "session closed"),
//! and anything interested reacts: logging, streaming responses, side
//! channels. Channels are identified by the event type itself, so the
//! compiler enforces that publishers and subscribers of a channel agree on
//! the payload shape.
//!
//! ## Features
//!
//! * **Type-Safe**: a channel is an event type; no stringly-typed topics.
//! * **Two consumption modes**: synchronous listeners invoked inline on the
//!   publishing thread, and lag-tolerant async event streams.
//! * **Safe mutation mid-dispatch**: each publish works on a snapshot, so
//!   listeners may subscribe and unsubscribe from inside a callback.
//! * **Isolated listeners**: a panicking listener is reported and skipped,
//!   never taking the publisher or its siblings down.
//! * **Low overhead**: `FxHashMap` + `parking_lot::RwLock`, locks never held
//!   while listeners run.
//!
//! # Example
//!
//! ```rust
//! use chatd_event_bus::{EventBus, EventBusError, EventReceiverExt};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct MessageReceived { body: String }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), EventBusError> {
//!     let bus = EventBus::new();
//!
//!     // Synchronous listeners run inline on the publishing thread.
//!     let delivered = Arc::new(AtomicUsize::new(0));
//!     let counter = Arc::clone(&delivered);
//!     let subscription = bus.subscribe(move |_event: &MessageReceived| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     });
//!
//!     // Async consumers attach an event stream to the same channel.
//!     let mut stream = bus.stream::<MessageReceived>()?;
//!
//!     bus.publish(MessageReceived { body: "hello".into() });
//!     assert_eq!(delivered.load(Ordering::SeqCst), 1);
//!
//!     let event = stream.next_event().await.expect("stream is open");
//!     assert_eq!(event.body, "hello");
//!
//!     subscription.unsubscribe();
//!     Ok(())
//! }
//! ```

mod bus;
mod error;
mod receiver;
mod subscription;

pub use bus::{Event, EventBus, Handler};
pub use error::{EventBusError, EventBusErrorExt};
pub use receiver::EventReceiverExt;
pub use subscription::Subscription;
