//! Log Multiplexer
//!
//! Every chunk written to a [`LogMux`] is appended to the daemon log file,
//! optionally echoed to stderr, and handed to each live LOGS subscriber.
//!
//! # Delivery
//!
//! Subscribers are held in a [`SubscriberSet`]. Delivery is a non-blocking
//! enqueue onto the subscriber's queue; the connection task that owns the
//! socket does the actual write, bounded by its own write timeout. A
//! subscriber whose receiver is gone is dropped from the set during the same
//! broadcast pass. Other subscribers are unaffected.
//!
//! The file append and the broadcast happen under one lock, so every
//! subscriber sees chunks in file order.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::DaemonError;
use crate::fs_utils;

/// Identifier handed out by [`SubscriberSet::add`]
pub type SubscriberId = u64;

/// A live consumer of log output
pub trait LogSubscriber: Send + Sync {
    /// Hand over a chunk without blocking. An error removes the subscriber.
    fn deliver(&self, chunk: &[u8]) -> io::Result<()>;
}

/// Subscriber backed by a tokio channel.
///
/// The queue is unbounded; a reader that stops draining it is cut off by
/// the connection's write timeout, which drops the receiver.
pub struct QueueSubscriber {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Create a queue subscriber and the receiver its connection drains
pub fn queue_subscriber() -> (QueueSubscriber, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSubscriber { tx }, rx)
}

impl LogSubscriber for QueueSubscriber {
    fn deliver(&self, chunk: &[u8]) -> io::Result<()> {
        self.tx
            .send(chunk.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "subscriber disconnected"))
    }
}

type Pruned = Vec<(SubscriberId, io::Error)>;

fn log_pruned(pruned: Pruned) {
    for (id, e) in pruned {
        tracing::debug!(subscriber = id, error = %e, "dropping log subscriber");
    }
}

/// Registry of live LOGS subscribers
#[derive(Default)]
pub struct SubscriberSet {
    inner: Mutex<Vec<(SubscriberId, Box<dyn LogSubscriber>)>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    pub fn add(&self, subscriber: Box<dyn LogSubscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().push((id, subscriber));
        id
    }

    /// Deregister a subscriber. Returns false if it was already pruned.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|(sid, _)| *sid != id);
        inner.len() != before
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.lock().iter().any(|(sid, _)| *sid == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every subscriber, closing their queues
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Deliver `chunk` to every subscriber, pruning the ones that fail.
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast(&self, chunk: &[u8]) -> usize {
        let (delivered, pruned) = self.deliver_all(chunk);
        // Logged after unlocking: the tracing writer feeds back into broadcast
        log_pruned(pruned);
        delivered
    }

    fn deliver_all(&self, chunk: &[u8]) -> (usize, Pruned) {
        let mut pruned = Vec::new();
        let mut inner = self.inner.lock();
        inner.retain(|(id, subscriber)| match subscriber.deliver(chunk) {
            Ok(()) => true,
            Err(e) => {
                pruned.push((*id, e));
                false
            }
        });
        (inner.len(), pruned)
    }
}

/// Append-only log file fanned out to live subscribers
pub struct LogMux {
    path: PathBuf,
    file: Mutex<File>,
    subscribers: Arc<SubscriberSet>,
    echo_stderr: bool,
}

impl std::fmt::Debug for LogMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogMux")
            .field("path", &self.path)
            .field("subscribers", &self.subscribers.len())
            .field("echo_stderr", &self.echo_stderr)
            .finish()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl LogMux {
    /// Open (creating if needed) the log file at `path`.
    ///
    /// Failure here is fatal for the daemon: without a sink there is nowhere
    /// to put child output.
    pub fn open(path: &Path, echo_stderr: bool) -> Result<Self, DaemonError> {
        let sink_err = |source| DaemonError::LogSink {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(sink_err)?;
        }
        let file = open_append(path).map_err(sink_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            subscribers: Arc::new(SubscriberSet::new()),
            echo_stderr,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscriber registry shared with the control server
    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    /// Persist `chunk` and broadcast it.
    ///
    /// Subscribers receive the chunk even if the file append fails; the file
    /// error is still reported to the caller.
    pub fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let (persisted, pruned) = {
            let mut file = self.file.lock();
            let persisted = file.write_all(chunk);
            if self.echo_stderr {
                let _ = io::stderr().write_all(chunk);
            }
            let (_, pruned) = self.subscribers.deliver_all(chunk);
            (persisted, pruned)
        };
        log_pruned(pruned);
        persisted
    }

    /// Rotate the file once it reaches `max_size` bytes, keeping one `.prev`
    /// generation, and continue writing into a fresh file.
    pub fn rotate_if_needed(&self, max_size: u64) -> io::Result<bool> {
        let mut file = self.file.lock();
        file.flush()?;
        if !fs_utils::rotate_file(&self.path, max_size)? {
            return Ok(false);
        }
        *file = open_append(&self.path)?;
        Ok(true)
    }

    /// `io::Write` handle for the tracing subscriber
    pub fn writer(self: &Arc<Self>) -> MuxWriter {
        MuxWriter(Arc::clone(self))
    }
}

/// `io::Write` adapter over a shared [`LogMux`]
#[derive(Clone)]
pub struct MuxWriter(Arc<LogMux>);

impl Write for MuxWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_chunk(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.file.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Subscriber that records chunks and can be told to fail
    #[derive(Default)]
    struct Recorder {
        chunks: Mutex<Vec<Vec<u8>>>,
        fail: std::sync::atomic::AtomicBool,
        attempts: AtomicUsize,
    }

    struct Shared(Arc<Recorder>);

    impl LogSubscriber for Shared {
        fn deliver(&self, chunk: &[u8]) -> io::Result<()> {
            self.0.attempts.fetch_add(1, Ordering::SeqCst);
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
            }
            self.0.chunks.lock().push(chunk.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_failed_subscriber_is_pruned_without_affecting_others() {
        let set = SubscriberSet::new();
        let good_a = Arc::new(Recorder::default());
        let bad = Arc::new(Recorder::default());
        let good_b = Arc::new(Recorder::default());

        let _a = set.add(Box::new(Shared(good_a.clone())));
        let bad_id = set.add(Box::new(Shared(bad.clone())));
        let _b = set.add(Box::new(Shared(good_b.clone())));
        bad.fail.store(true, Ordering::SeqCst);

        assert_eq!(set.broadcast(b"one"), 2);
        assert!(!set.contains(bad_id));
        assert_eq!(set.broadcast(b"two"), 2);

        // The failing subscriber was not tried again on the next pass
        assert_eq!(bad.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(*good_a.chunks.lock(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(*good_b.chunks.lock(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let set = SubscriberSet::new();
        let id = set.add(Box::new(Shared(Arc::new(Recorder::default()))));
        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());
    }

    #[test]
    fn test_busy_queue_keeps_subscriber_until_closed() {
        let set = SubscriberSet::new();
        let (sub, mut rx) = queue_subscriber();
        let id = set.add(Box::new(sub));

        // Nothing drains the queue during the burst
        for i in 0..2000 {
            assert_eq!(set.broadcast(format!("line {}\n", i).as_bytes()), 1);
        }
        assert!(set.contains(id));
        assert_eq!(rx.try_recv().unwrap(), b"line 0\n".to_vec());

        drop(rx);
        assert_eq!(set.broadcast(b"after"), 0);
        assert!(!set.contains(id));
    }

    #[test]
    fn test_closed_queue_reports_broken_pipe() {
        let (sub, rx) = queue_subscriber();
        drop(rx);
        let closed = sub.deliver(b"c").unwrap_err();
        assert_eq!(closed.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_write_chunk_persists_and_broadcasts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/daemon.log");
        let mux = LogMux::open(&path, false).unwrap();

        let (sub, mut rx) = queue_subscriber();
        mux.subscribers().add(Box::new(sub));

        mux.write_chunk(b"hello\n").unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"hello\n".to_vec());
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_dropped_receiver_is_pruned_on_next_write() {
        let dir = TempDir::new().unwrap();
        let mux = LogMux::open(&dir.path().join("d.log"), false).unwrap();

        let (sub, rx) = queue_subscriber();
        let id = mux.subscribers().add(Box::new(sub));
        drop(rx);

        mux.write_chunk(b"x").unwrap();
        assert!(!mux.subscribers().contains(id));
    }

    #[test]
    fn test_rotate_reopens_fresh_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("d.log");
        let mux = LogMux::open(&path, false).unwrap();

        mux.write_chunk(b"0123456789").unwrap();
        assert!(!mux.rotate_if_needed(1024).unwrap());
        assert!(mux.rotate_if_needed(10).unwrap());
        mux.write_chunk(b"after").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "after");
        assert_eq!(
            fs::read_to_string(fs_utils::previous_generation(&path)).unwrap(),
            "0123456789"
        );
    }

    #[test]
    fn test_open_fails_on_directory_path() {
        let dir = TempDir::new().unwrap();
        let err = LogMux::open(dir.path(), false).err().unwrap();
        assert!(matches!(err, DaemonError::LogSink { .. }));
    }

    #[test]
    fn test_concurrent_writers_reach_subscribers_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("d.log");
        let mux = Arc::new(LogMux::open(&path, false).unwrap());
        let (sub, mut rx) = queue_subscriber();
        mux.subscribers().add(Box::new(sub));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let mux = Arc::clone(&mux);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        mux.write_chunk(format!("w{}-{}\n", w, i).as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut streamed = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            streamed.extend_from_slice(&chunk);
        }
        assert_eq!(streamed, fs::read(&path).unwrap());
    }
}
