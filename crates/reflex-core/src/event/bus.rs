// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{Arc, Mutex, PoisonError};

/// Broadcasts events of type `T` to an explicit list of subscribers.
///
/// Each call to [`subscribe`](Self::subscribe) opens a dedicated unbounded channel,
/// so a slow consumer never blocks the publisher or the other subscribers.
/// Cloning the bus yields another publishing handle onto the same subscriber list.
#[derive(Debug)]
pub struct EventBus<T: Clone + Send + 'static> {
    subscribers: Arc<Mutex<Vec<flume::Sender<T>>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Creates a new EventBus with no subscribers.
    pub fn new() -> Self {
        log::debug!("Generic EventBus initialized.");
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a new subscriber and returns the receiving end of its channel.
    ///
    /// Dropping the receiver unsubscribes it on the next publish.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Sends `event` to every live subscriber and returns how many received it.
    ///
    /// The subscriber lock is released before any event is delivered.
    pub fn publish(&self, event: T) -> usize {
        log::trace!("Publishing an event.");

        let senders: Vec<flume::Sender<T>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        let mut saw_disconnected = false;
        for sender in &senders {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                saw_disconnected = true;
            }
        }

        if saw_disconnected {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|sender| !sender.is_disconnected());
            log::debug!(
                "Pruned disconnected subscribers, {} remaining.",
                subscribers.len()
            );
        }

        delivered
    }

    /// Returns the number of registered subscribers, including ones not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone + Send + 'static> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flume::TryRecvError;
    use std::{thread, time::Duration};

    /// A local, self-contained event enum for testing purposes.
    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Resized { width: u32, height: u32 },
        KeyPressed { key_code: String },
        ShutdownRequested,
    }

    fn dummy_key_event() -> TestEvent {
        TestEvent::KeyPressed {
            key_code: "Test".to_string(),
        }
    }

    #[test]
    fn publish_without_subscribers_delivers_nothing() {
        let bus = EventBus::<TestEvent>::new();
        assert_eq!(bus.publish(TestEvent::ShutdownRequested), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn every_subscriber_receives_every_event() {
        let bus = EventBus::<TestEvent>::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        let event1 = TestEvent::Resized {
            width: 1,
            height: 1,
        };
        let event2 = dummy_key_event();

        assert_eq!(bus.publish(event1.clone()), 2);
        assert_eq!(bus.publish(event2.clone()), 2);

        for receiver in [&first, &second] {
            assert_eq!(receiver.try_recv(), Ok(event1.clone()));
            assert_eq!(receiver.try_recv(), Ok(event2.clone()));
            assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::<TestEvent>::new();
        bus.publish(TestEvent::ShutdownRequested);
        let receiver = bus.subscribe();
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::<TestEvent>::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        assert_eq!(bus.publish(dummy_key_event()), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(dummy_key_event()));
    }

    #[test]
    fn clones_share_the_subscriber_list() {
        let bus = EventBus::<TestEvent>::new();
        let publisher = bus.clone();
        let receiver = bus.subscribe();

        let handle = thread::spawn(move || {
            publisher.publish(TestEvent::ShutdownRequested);
        });
        handle.join().expect("Thread join failed");

        match receiver.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => assert_eq!(event, TestEvent::ShutdownRequested),
            Err(e) => panic!("Failed to receive event from thread: {e:?}"),
        }
    }
}
