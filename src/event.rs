//! Single-slot latch used as the rendezvous between the byte-level receiver
//! and the frame-level consumer (`ev_t` / `event.c` in the original).
//!
//! The C implementation conditionally compiles a POSIX semaphore
//! (`EV_USE_THREADS`) or a plain flag check into the same `ev_get`. Rust
//! models both behind one type selected at construction: a `Mutex` +
//! `Condvar` pair stands in for the counting semaphore (`post` that arrives
//! while already active overwrites the tag without an extra wakeup, exactly
//! like `sem_post` is skipped when swallowed by the "already active" flag
//! in the reference semantics), and the non-threaded path never blocks.

use std::sync::{Condvar, Mutex};

/// One of the four events a latch can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    None,
    Received,
    Execute,
    Sent,
}

struct EventState {
    tag: EventTag,
    active: bool,
}

/// At-most-one-pending-event latch.
pub struct Event {
    state: Mutex<EventState>,
    condvar: Condvar,
    threaded: bool,
}

impl Event {
    /// Creates a new, empty latch. `threaded` selects whether [`Event::get`]
    /// blocks (parallel-threads build) or polls without blocking
    /// (single-threaded cooperative build).
    pub fn new(threaded: bool) -> Self {
        Event {
            state: Mutex::new(EventState {
                tag: EventTag::None,
                active: false,
            }),
            condvar: Condvar::new(),
            threaded,
        }
    }

    /// Posts (signals) `tag`. A post that arrives while a prior post is
    /// still unacknowledged overwrites the tag but does not double-count
    /// the wakeup.
    pub fn post(&self, tag: EventTag) {
        let mut state = self.state.lock().expect("event mutex poisoned");
        state.tag = tag;
        state.active = true;
        if self.threaded {
            self.condvar.notify_one();
        }
    }

    /// Retrieves the pending event. In the threaded build this blocks until
    /// one is posted and always returns `Some`; in the cooperative build it
    /// returns `None` immediately if nothing is pending.
    pub fn get(&self) -> Option<EventTag> {
        if self.threaded {
            let mut state = self.state.lock().expect("event mutex poisoned");
            while !state.active {
                state = self.condvar.wait(state).expect("event mutex poisoned");
            }
            state.active = false;
            Some(state.tag)
        } else {
            let mut state = self.state.lock().expect("event mutex poisoned");
            if state.active {
                state.active = false;
                Some(state.tag)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cooperative_get_is_non_blocking_when_empty() {
        let ev = Event::new(false);
        assert_eq!(ev.get(), None);
    }

    #[test]
    fn post_then_get_consumes_once() {
        let ev = Event::new(false);
        ev.post(EventTag::Received);
        assert_eq!(ev.get(), Some(EventTag::Received));
        assert_eq!(ev.get(), None);
    }

    #[test]
    fn double_post_overwrites_tag_without_extra_release() {
        let ev = Event::new(false);
        ev.post(EventTag::Received);
        ev.post(EventTag::Sent);
        assert_eq!(ev.get(), Some(EventTag::Sent));
        assert_eq!(ev.get(), None);
    }

    #[test]
    fn threaded_get_blocks_until_posted() {
        let ev = Arc::new(Event::new(true));
        let ev2 = ev.clone();
        let handle = thread::spawn(move || ev2.get());
        thread::sleep(Duration::from_millis(20));
        ev.post(EventTag::Execute);
        assert_eq!(handle.join().unwrap(), Some(EventTag::Execute));
    }
}
