//! Event channel implementation using crossbeam-channel.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Sends build events from the core library.
///
/// Cheap to clone; every rayon batch worker may hold one.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Send an event.
    ///
    /// If the receiver is dropped, the event is silently discarded so
    /// progress reporting stays optional.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

/// Receives build events on the listening side.
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Iterate until every sender has been dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Factory for sender/receiver pairs.
pub struct EventChannel;

impl EventChannel {
    /// Create a new unbounded event channel.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// A no-op event sender for callers that don't track progress.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{HashEvent, HashProgress, ScanEvent};
    use std::thread;

    #[test]
    fn events_can_be_sent_across_threads() {
        let (sender, receiver) = EventChannel::new();

        let handle = thread::spawn(move || {
            sender.send(Event::Hash(HashEvent::Progress(HashProgress {
                completed: 20,
                discovered: 25,
            })));
        });

        handle.join().unwrap();

        match receiver.try_recv() {
            Some(Event::Hash(HashEvent::Progress(p))) => assert_eq!(p.completed, 20),
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn iteration_ends_when_senders_drop() {
        let (sender, receiver) = EventChannel::new();
        sender.send(Event::Scan(ScanEvent::Completed { total_files: 3 }));
        drop(sender);

        assert_eq!(receiver.iter().count(), 1);
    }

    #[test]
    fn null_sender_does_not_panic() {
        let sender = null_sender();
        sender.send(Event::Scan(ScanEvent::Completed { total_files: 0 }));
    }
}
