//! Single-writer, multi-subscriber change streams.
//!
//! Each subscription owns a closable queue. Writes fan out to every
//! queue that is still open and externally referenced; stale queues are
//! pruned on the next write. All mutation happens on the owning
//! simulator thread, so queues are plain `Rc<RefCell>` cells.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::tensor::{Buffer, BufferBuilder};

struct ClosableQueue<T> {
    open: bool,
    items: VecDeque<T>,
}

/// Fan-out writer end of a change stream.
pub struct Stream<T> {
    queues: Vec<Rc<RefCell<ClosableQueue<T>>>>,
}

impl<T: Clone> Stream<T> {
    pub fn new() -> Self {
        Self { queues: Vec::new() }
    }

    /// Deliver a value to every live subscriber, pruning queues that are
    /// closed or whose reader was dropped.
    pub fn write(&mut self, value: T) {
        self.queues.retain(|queue| {
            let live = queue.borrow().open && Rc::strong_count(queue) > 1;
            if live {
                queue.borrow_mut().items.push_back(value.clone());
            }
            live
        });
    }

    /// Open a subscription. The reader observes every write after this
    /// point, in write order.
    pub fn subscribe(&mut self) -> StreamReader<T> {
        let queue = Rc::new(RefCell::new(ClosableQueue {
            open: true,
            items: VecDeque::new(),
        }));
        self.queues.push(queue.clone());
        StreamReader { queue }
    }

    /// Number of live subscriptions (stale queues linger until the next
    /// write).
    pub fn subscriber_count(&self) -> usize {
        self.queues.len()
    }
}

impl<T: Clone> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader end of a subscription.
pub struct StreamReader<T> {
    queue: Rc<RefCell<ClosableQueue<T>>>,
}

impl<T: Clone> StreamReader<T> {
    pub fn open(&self) -> bool {
        self.queue.borrow().open
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().items.is_empty()
    }

    /// Drain everything buffered so far, in write order.
    pub fn read(&mut self) -> Buffer<T> {
        let mut queue = self.queue.borrow_mut();
        let mut builder = BufferBuilder::with_capacity(queue.items.len());
        while let Some(item) = queue.items.pop_front() {
            builder.add(item);
        }
        builder.build()
    }

    /// Stop receiving new writes. Values buffered before the close are
    /// still returned by the next `read`.
    pub fn close(&mut self) {
        self.queue.borrow_mut().open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_windows() {
        let mut stream = Stream::new();

        let mut sub1 = stream.subscribe();
        let mut sub2 = stream.subscribe();

        stream.write(1);
        stream.write(2);

        let mut sub3 = stream.subscribe();

        stream.write(3);
        stream.write(4);

        sub1.close();

        let mut sub4 = stream.subscribe();

        stream.write(5);

        sub2.close();

        stream.write(6);

        sub3.close();
        sub4.close();

        assert!(!sub1.open());
        assert!(!sub2.open());
        assert!(!sub3.open());
        assert!(!sub4.open());

        assert_eq!(sub1.read().as_slice(), &[1, 2, 3, 4]);
        assert_eq!(sub2.read().as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(sub3.read().as_slice(), &[3, 4, 5, 6]);
        assert_eq!(sub4.read().as_slice(), &[5, 6]);

        assert!(sub1.read().is_empty());
        assert!(sub2.read().is_empty());
        assert!(sub3.read().is_empty());
        assert!(sub4.read().is_empty());
    }

    #[test]
    fn test_subscribe_open_close_scenario() {
        let mut stream = Stream::new();

        let mut sub_a = stream.subscribe();
        stream.write(1);
        stream.write(2);
        assert_eq!(sub_a.read().as_slice(), &[1, 2]);

        let mut sub_b = stream.subscribe();
        stream.write(3);
        stream.write(4);
        assert_eq!(sub_a.read().as_slice(), &[3, 4]);
        sub_a.close();

        let mut sub_c = stream.subscribe();
        stream.write(5);
        stream.write(6);
        assert_eq!(sub_b.read().as_slice(), &[3, 4, 5, 6]);
        assert_eq!(sub_c.read().as_slice(), &[5, 6]);
    }

    #[test]
    fn test_dropped_reader_is_pruned() {
        let mut stream = Stream::new();
        let sub = stream.subscribe();
        let mut kept = stream.subscribe();
        assert_eq!(stream.subscriber_count(), 2);

        drop(sub);
        stream.write(7);
        assert_eq!(stream.subscriber_count(), 1);
        assert_eq!(kept.read().as_slice(), &[7]);
    }
}
