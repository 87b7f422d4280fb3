//! Single-slot, lock-free value exchange between two threads
//!
//! A triple buffer: the publisher and the receiver each own one slot, and a
//! third "back" slot is handed between them with a single atomic swap. The
//! back index and a dirty bit share one `AtomicU8`.
//!
//! - Publishing never blocks and overwrites any value not yet consumed
//! - Consuming never blocks and sees either nothing or a complete value
//! - No allocation after construction, as long as `T::clone_from` reuses storage

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const INDEX_MASK: u8 = 0b011;
const DIRTY: u8 = 0b100;

struct Slots<T> {
    buffers: [UnsafeCell<T>; 3],
    back: AtomicU8,
}

// Each buffer is only ever accessed by the side whose index currently points
// at it; ownership changes hands through `back`.
unsafe impl<T: Send> Sync for Slots<T> {}

/// Create a connected publisher/receiver pair, every slot starting as `initial`
pub fn channel<T: Clone + Send>(initial: T) -> (Publisher<T>, Receiver<T>) {
    let slots = Arc::new(Slots {
        buffers: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial),
        ],
        back: AtomicU8::new(1),
    });

    let publisher = Publisher {
        slots: slots.clone(),
        write: 0,
    };
    let receiver = Receiver { slots, read: 2 };
    (publisher, receiver)
}

/// Writing half of an exchange
pub struct Publisher<T> {
    slots: Arc<Slots<T>>,
    write: u8,
}

impl<T> Publisher<T> {
    /// Publish a copy of `value`, replacing anything not yet consumed
    pub fn publish(&mut self, value: &T)
    where
        T: Clone,
    {
        self.publish_with(|slot| slot.clone_from(value));
    }

    /// Fill the write slot in place, then publish it
    ///
    /// The slot holds whatever stale value last passed through it, so `fill`
    /// must overwrite it completely.
    pub fn publish_with<F: FnOnce(&mut T)>(&mut self, fill: F) {
        // Safety: `write` is owned exclusively by this publisher
        let slot = unsafe { &mut *self.slots.buffers[self.write as usize].get() };
        fill(slot);

        let previous = self.slots.back.swap(self.write | DIRTY, Ordering::AcqRel);
        self.write = previous & INDEX_MASK;
    }
}

/// Reading half of an exchange
pub struct Receiver<T> {
    slots: Arc<Slots<T>>,
    read: u8,
}

impl<T> Receiver<T> {
    /// Whether a published value is waiting to be consumed
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.slots.back.load(Ordering::Acquire) & DIRTY != 0
    }

    /// Copy the pending value into `into`
    ///
    /// Returns `false` and leaves `into` untouched when nothing is pending.
    pub fn consume(&mut self, into: &mut T) -> bool
    where
        T: Clone,
    {
        match self.take() {
            Some(value) => {
                into.clone_from(value);
                true
            }
            None => false,
        }
    }

    /// Swap the pending value into `into`
    ///
    /// The previous content of `into` is recycled as a future write slot.
    pub fn consume_swap(&mut self, into: &mut T) -> bool {
        match self.take() {
            Some(value) => {
                core::mem::swap(value, into);
                true
            }
            None => false,
        }
    }

    fn take(&mut self) -> Option<&mut T> {
        if !self.has_pending() {
            return None;
        }

        // Only the publisher can touch `back` in between, and it can only set
        // the dirty bit again.
        let previous = self.slots.back.swap(self.read, Ordering::AcqRel);
        self.read = previous & INDEX_MASK;

        // Safety: `read` is owned exclusively by this receiver
        Some(unsafe { &mut *self.slots.buffers[self.read as usize].get() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn nothing_pending_leaves_target_untouched() {
        let (_publisher, mut receiver) = channel(0u32);
        let mut target = 42;
        assert!(!receiver.has_pending());
        assert!(!receiver.consume(&mut target));
        assert_eq!(target, 42);
    }

    #[test]
    fn consumed_at_most_once() {
        let (mut publisher, mut receiver) = channel(0u32);
        publisher.publish(&7);

        let mut target = 0;
        assert!(receiver.consume(&mut target));
        assert_eq!(target, 7);
        assert!(!receiver.consume(&mut target));
    }

    #[test]
    fn newer_publish_supersedes_older() {
        let (mut publisher, mut receiver) = channel(String::new());
        publisher.publish(&"first".to_string());
        publisher.publish(&"second".to_string());

        let mut target = String::new();
        assert!(receiver.consume(&mut target));
        assert_eq!(target, "second");
        assert!(!receiver.consume(&mut target));
    }

    #[test]
    fn consume_swap_moves_value() {
        let (mut publisher, mut receiver) = channel(Vec::<u8>::new());
        publisher.publish_with(|slot| {
            slot.clear();
            slot.extend_from_slice(b"abc");
        });

        let mut live = b"old".to_vec();
        assert!(receiver.consume_swap(&mut live));
        assert_eq!(live, b"abc");

        publisher.publish(&b"next".to_vec());
        assert!(receiver.consume_swap(&mut live));
        assert_eq!(live, b"next");
    }

    #[test]
    fn no_torn_reads_across_threads() {
        const LEN: usize = 64;
        const ROUNDS: u64 = 20_000;

        let (mut publisher, mut receiver) = channel(vec![0u64; LEN]);

        let writer = thread::spawn(move || {
            for round in 1..=ROUNDS {
                publisher.publish_with(|slot| slot.iter_mut().for_each(|v| *v = round));
            }
        });

        let mut seen = vec![0u64; LEN];
        let mut last = 0;
        while last < ROUNDS {
            if receiver.consume(&mut seen) {
                let first = seen[0];
                assert!(seen.iter().all(|v| *v == first), "torn read: {:?}", seen);
                assert!(first > last, "went backwards from {} to {}", last, first);
                last = first;
            }
        }

        writer.join().unwrap();
    }
}
