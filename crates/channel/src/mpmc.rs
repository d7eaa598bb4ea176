// SPDX-License-Identifier: Apache-2.0

//! Multiple-producer, multiple-consumer bounded queue backed by OS threads.

use crate::error::{RecvError, SendError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct ChannelState<T> {
    buffer: VecDeque<T>,
    capacity: NonZeroUsize,
    is_closed: bool,
    senders: usize,
    receivers: usize,
}

struct Channel<T> {
    state: Mutex<ChannelState<T>>,
    /// Signalled when an item is removed or the queue closes.
    not_full: Condvar,
    /// Signalled when an item is inserted or the queue closes.
    not_empty: Condvar,
}

/// Creates a bounded queue with the given capacity, returning the sending
/// and receiving halves. Both halves are cloneable; the queue closes when
/// either side is fully dropped or [`Sender::close`] is called.
pub fn bounded<T>(capacity: NonZeroUsize) -> (Sender<T>, Receiver<T>) {
    let channel = Arc::new(Channel {
        state: Mutex::new(ChannelState {
            buffer: VecDeque::with_capacity(capacity.get()),
            capacity,
            is_closed: false,
            senders: 1,
            receivers: 1,
        }),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
    });

    (
        Sender {
            channel: channel.clone(),
        },
        Receiver { channel },
    )
}

/// The sending half of a bounded queue.
pub struct Sender<T> {
    channel: Arc<Channel<T>>,
}

/// The receiving half of a bounded queue.
pub struct Receiver<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        let mut state = self.channel.state.lock();
        state.senders += 1;
        drop(state);
        Sender {
            channel: self.channel.clone(),
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        let mut state = self.channel.state.lock();
        state.receivers += 1;
        drop(state);
        Receiver {
            channel: self.channel.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.channel.state.lock();
        state.senders -= 1;

        // Last sender gone: drain-only mode, unblock every waiting receiver.
        if state.senders == 0 {
            state.is_closed = true;
            drop(state);
            self.channel.not_empty.notify_all();
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.channel.state.lock();
        state.receivers -= 1;

        // Last receiver gone: nothing can ever drain, unblock every sender.
        if state.receivers == 0 {
            state.is_closed = true;
            drop(state);
            self.channel.not_full.notify_all();
        }
    }
}

impl<T> Sender<T> {
    /// Inserts an item, blocking while the queue is at capacity.
    ///
    /// Returns the item back inside [`SendError::Closed`] if the queue is
    /// closed before space becomes available.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.channel.state.lock();
        loop {
            if state.is_closed {
                return Err(SendError::Closed(value));
            }
            if state.buffer.len() < state.capacity.get() {
                state.buffer.push_back(value);
                drop(state);
                // Waiters are queued FIFO, so the longest-blocked receiver
                // is the one woken.
                self.channel.not_empty.notify_one();
                return Ok(());
            }
            self.channel.not_full.wait(&mut state);
        }
    }

    /// Inserts an item without blocking.
    pub fn try_send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.channel.state.lock();
        if state.is_closed {
            return Err(SendError::Closed(value));
        }
        if state.buffer.len() >= state.capacity.get() {
            return Err(SendError::Full(value));
        }
        state.buffer.push_back(value);
        drop(state);
        self.channel.not_empty.notify_one();
        Ok(())
    }

    /// Closes the queue. Pending items remain receivable; blocked senders
    /// and receivers are woken.
    pub fn close(&self) {
        let mut state = self.channel.state.lock();
        state.is_closed = true;
        drop(state);
        self.channel.not_empty.notify_all();
        self.channel.not_full.notify_all();
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.channel.state.lock().buffer.len()
    }

    /// True when no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity the queue was created with.
    pub fn capacity(&self) -> usize {
        self.channel.state.lock().capacity.get()
    }
}

impl<T> Receiver<T> {
    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns [`RecvError::Closed`] once the queue is closed and drained.
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut state = self.channel.state.lock();
        loop {
            if let Some(value) = state.buffer.pop_front() {
                drop(state);
                self.channel.not_full.notify_one();
                return Ok(value);
            }
            if state.is_closed {
                return Err(RecvError::Closed);
            }
            self.channel.not_empty.wait(&mut state);
        }
    }

    /// Removes the oldest item without blocking.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut state = self.channel.state.lock();
        if let Some(value) = state.buffer.pop_front() {
            drop(state);
            self.channel.not_full.notify_one();
            Ok(value)
        } else if state.is_closed {
            Err(RecvError::Closed)
        } else {
            Err(RecvError::Empty)
        }
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.channel.state.lock().buffer.len()
    }

    /// True when no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity the queue was created with.
    pub fn capacity(&self) -> usize {
        self.channel.state.lock().capacity.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_basic_queue_operations() {
        let (tx, rx) = bounded(cap(2));

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);

        assert!(matches!(rx.try_recv(), Err(RecvError::Empty)));
    }

    #[test]
    fn test_queue_capacity() {
        let (tx, _rx) = bounded(cap(1));

        tx.send(1).unwrap();
        match tx.try_send(2) {
            Err(SendError::Full(2)) => (),
            other => panic!("Expected Full error, got {other:?}"),
        }
    }

    #[test]
    fn test_fifo_order_multiple_producers() {
        let (tx1, rx) = bounded(cap(4));
        let tx2 = tx1.clone();

        tx1.send(1).unwrap();
        tx2.send(2).unwrap();
        tx1.send(3).unwrap();

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
        assert_eq!(rx.recv().unwrap(), 3);
    }

    /// Capacity-2 queue with three producers: the third enqueue blocks
    /// until a consumer dequeues, and the first value out is the first in.
    #[test]
    fn test_third_producer_blocks_until_dequeue() {
        let (tx, rx) = bounded(cap(2));

        tx.send(10).unwrap();
        tx.send(20).unwrap();

        let third_done = Arc::new(AtomicBool::new(false));
        let third_done_clone = third_done.clone();
        let tx3 = tx.clone();
        let producer = thread::spawn(move || {
            tx3.send(30).unwrap();
            third_done_clone.store(true, Ordering::SeqCst);
        });

        // Give the third producer time to block on the full queue.
        thread::sleep(Duration::from_millis(50));
        assert!(!third_done.load(Ordering::SeqCst));

        assert_eq!(rx.recv().unwrap(), 10);
        producer.join().unwrap();
        assert!(third_done.load(Ordering::SeqCst));

        assert_eq!(rx.recv().unwrap(), 20);
        assert_eq!(rx.recv().unwrap(), 30);
    }

    #[test]
    fn test_recv_blocks_until_send() {
        let (tx, rx) = bounded(cap(1));

        let consumer = thread::spawn(move || rx.recv().unwrap());
        thread::sleep(Duration::from_millis(20));
        tx.send(7).unwrap();
        assert_eq!(consumer.join().unwrap(), 7);
    }

    #[test]
    fn test_concurrent_producers_consume_everything() {
        let (tx, rx) = bounded(cap(4));
        let n_per_producer = 100;
        let producers: Vec<_> = (0..3)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..n_per_producer {
                        tx.send(p * n_per_producer + i).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        let mut received = Vec::new();
        while let Ok(v) = rx.recv() {
            received.push(v);
        }
        for p in producers {
            p.join().unwrap();
        }

        received.sort_unstable();
        let expected: Vec<_> = (0..3 * n_per_producer).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let (tx, rx) = bounded(cap(2));
        tx.send(1).unwrap();
        tx.close();

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv(), Err(RecvError::Closed));
        match tx.send(2) {
            Err(SendError::Closed(2)) => (),
            other => panic!("Expected Closed error, got {other:?}"),
        }
    }

    #[test]
    fn test_sender_drop_closes_queue() {
        let (tx, rx) = bounded(cap(1));
        tx.send(1).unwrap();
        drop(tx);

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv(), Err(RecvError::Closed));
    }

    #[test]
    fn test_receiver_drop_unblocks_sender() {
        let (tx, rx) = bounded(cap(1));
        tx.send(1).unwrap();

        let producer = thread::spawn(move || tx.send(2));
        thread::sleep(Duration::from_millis(20));
        drop(rx);

        match producer.join().unwrap() {
            Err(SendError::Closed(2)) => (),
            other => panic!("Expected Closed error, got {other:?}"),
        }
    }

    #[test]
    fn test_len_and_capacity() {
        let (tx, rx) = bounded(cap(3));
        assert_eq!(tx.capacity(), 3);
        assert!(tx.is_empty());
        tx.send('a').unwrap();
        tx.send('b').unwrap();
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().unwrap(), 'a');
        assert_eq!(rx.len(), 1);
    }
}
