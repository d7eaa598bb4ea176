// SPDX-License-Identifier: Apache-2.0

//! The pipeline stage threads: reader, producer, consumer, writer.
//!
//! The reader feeds `n` items and one end-of-stream sentinel into the
//! reader queue. Producers re-sow the sentinel for their siblings and
//! exit. Consumers have no sentinel of their own: they drain the worker
//! queue until it is closed or their cancel flag is raised, so the pool
//! can change size without sentinel bookkeeping. The writer counts `n`
//! outputs and raises the completion signal.

use crate::error::Error;
use crate::item::{Item, Message, Transform};
use minos_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Spawns a named OS thread, mapping spawn failure to a typed error.
pub(crate) fn spawn_named<T, F>(name: &str, body: F) -> Result<JoinHandle<T>, Error>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| Error::ThreadSpawn {
            thread_name: name.to_string(),
            source: e,
        })
}

/// Joins a thread, mapping a panic to a typed error.
pub(crate) fn join_thread<T>(name: &str, handle: JoinHandle<T>) -> Result<T, Error> {
    handle.join().map_err(|panic| Error::ThreadPanic {
        thread_name: name.to_string(),
        panic_message: format!("{panic:?}"),
    })
}

/// One-shot completion flag the writer raises and the controller polls
/// with a bounded wait.
pub(crate) struct CompletionSignal {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        CompletionSignal {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Raises the flag and wakes every waiter.
    pub(crate) fn signal(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.condvar.notify_all();
    }

    /// Waits up to `timeout` for the flag. Returns its state.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if *done {
            return true;
        }
        let _ = self.condvar.wait_for(&mut done, timeout);
        *done
    }
}

/// Spawns the reader: `n` items from `path`, then one sentinel.
///
/// The sentinel is sent even when reading fails, so the producer pool
/// always winds down.
pub(crate) fn spawn_reader(
    n: u64,
    path: PathBuf,
    tx: Sender<Message>,
) -> Result<JoinHandle<Result<u64, Error>>, Error> {
    spawn_named("reader", move || {
        let result = read_items(n, &path, &tx);
        let _ = tx.send(Message::Eos);
        debug!("reader finished");
        result
    })
}

fn read_items(n: u64, path: &Path, tx: &Sender<Message>) -> Result<u64, Error> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    let mut sent = 0u64;
    while sent < n {
        let Some(line) = lines.next() else { break };
        let item = Item::parse_line(&line?, sent + 1)?;
        if tx.send(Message::Item(item)).is_err() {
            break;
        }
        sent += 1;
    }
    if sent < n {
        return Err(Error::InputExhausted {
            expected: n,
            got: sent,
        });
    }
    Ok(sent)
}

/// Spawns one producer: reader queue in, worker queue out. On the
/// sentinel it re-sows it for sibling producers and exits.
pub(crate) fn spawn_producer(
    index: usize,
    reader_rx: Receiver<Message>,
    reader_tx: Sender<Message>,
    worker_tx: Sender<Message>,
    transform: Arc<dyn Transform>,
) -> Result<JoinHandle<u64>, Error> {
    spawn_named(&format!("producer-{index}"), move || {
        let mut processed = 0u64;
        loop {
            match reader_rx.recv() {
                Ok(Message::Item(item)) => {
                    let out = transform.producer_stage(item);
                    if worker_tx.send(Message::Item(out)).is_err() {
                        break;
                    }
                    processed += 1;
                }
                Ok(Message::Eos) => {
                    // The slot this sentinel occupied is free again, so
                    // re-sowing cannot block.
                    let _ = reader_tx.send(Message::Eos);
                    break;
                }
                Err(_) => break,
            }
        }
        debug!(producer = index, items = processed, "producer finished");
        processed
    })
}

/// A consumer thread plus the cancel flag the controller uses to shrink
/// the pool.
pub(crate) struct ConsumerHandle {
    /// Raised by the controller; honoured after the next item.
    pub(crate) cancel: Arc<AtomicBool>,
    /// The thread, yielding its processed-item count.
    pub(crate) handle: JoinHandle<u64>,
    /// Thread name, for panic reports.
    pub(crate) name: String,
}

/// Spawns one consumer: worker queue in, writer queue out. Exits when
/// the worker queue closes, the writer queue closes, or its cancel flag
/// is observed after an item.
pub(crate) fn spawn_consumer(
    index: usize,
    worker_rx: Receiver<Message>,
    writer_tx: Sender<Message>,
    transform: Arc<dyn Transform>,
) -> Result<ConsumerHandle, Error> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let name = format!("consumer-{index}");
    let handle = spawn_named(&name, move || {
        let mut processed = 0u64;
        loop {
            match worker_rx.recv() {
                Ok(Message::Item(item)) => {
                    let out = transform.consumer_stage(item);
                    if writer_tx.send(Message::Item(out)).is_err() {
                        break;
                    }
                    processed += 1;
                    // Cooperative cancellation point: a shrink signal
                    // takes effect after the item in hand.
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                }
                // Stray sentinel: not ours to act on.
                Ok(Message::Eos) => continue,
                Err(_) => break,
            }
        }
        debug!(consumer = index, items = processed, "consumer finished");
        processed
    })?;
    Ok(ConsumerHandle {
        cancel,
        handle,
        name,
    })
}

/// Spawns the writer: emits `n` output lines then raises the completion
/// signal. The signal is raised even on early termination so the
/// controller always stops.
pub(crate) fn spawn_writer(
    n: u64,
    path: PathBuf,
    rx: Receiver<Message>,
    completion: Arc<CompletionSignal>,
) -> Result<JoinHandle<Result<u64, Error>>, Error> {
    spawn_named("writer", move || {
        let result = write_items(n, &path, &rx);
        completion.signal();
        debug!("writer finished");
        result
    })
}

fn write_items(n: u64, path: &Path, rx: &Receiver<Message>) -> Result<u64, Error> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut written = 0u64;
    while written < n {
        match rx.recv() {
            Ok(Message::Item(item)) => {
                writeln!(out, "{}", item.to_output_line())?;
                written += 1;
            }
            Ok(Message::Eos) => continue,
            // Queue closed: the run is winding down early.
            Err(_) => break,
        }
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_completion_signal_wakes_waiter() {
        let signal = Arc::new(CompletionSignal::new());
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        signal.signal();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_completion_signal_times_out() {
        let signal = CompletionSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
