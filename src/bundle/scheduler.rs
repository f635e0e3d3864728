//! Decompress scheduler (C4): a bounded worker pool keyed by commit ID, with
//! cancel-by-re-enqueue semantics. The only concurrent subsystem in the
//! crate — everything else is single-threaded.

use crate::bundle::store::ArtifactStore;
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

enum Message {
    Run(String),
    Shutdown,
}

struct Shared {
    /// Keys currently queued or running. A worker checks this before running
    /// a task to decide whether it was cancelled in the meantime;
    /// cancellation is advisory, an in-flight extract always finishes.
    /// Removal and the condvar notification happen under the same lock so a
    /// `wait_for` call can never observe a key as live and then miss the
    /// wakeup when the worker finishes it.
    live_keys: Mutex<HashSet<String>>,
    done: Condvar,
}

/// Bounded pool of workers that extract bundles in the background.
pub struct DecompressScheduler {
    sender: Sender<Message>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl DecompressScheduler {
    /// Constructs a pool with `pool_size` worker threads. Callers that read
    /// `background_decompression_layers == 0` from configuration should
    /// simply not construct one at all — `enqueue`/`wait_for` have no
    /// meaningful no-op mode baked in here, lazy construction lives one
    /// layer up in the session runner.
    pub fn new(store: Arc<ArtifactStore>, pool_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(Shared { live_keys: Mutex::new(HashSet::new()), done: Condvar::new() });

        let mut workers = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let receiver = Arc::clone(&receiver);
            let shared = Arc::clone(&shared);
            let store = Arc::clone(&store);
            workers.push(std::thread::spawn(move || worker_loop(receiver, shared, store)));
        }

        Self { sender, shared, workers }
    }

    /// Cancels any running/queued task whose key is not in `keys`, then
    /// enqueues every key in `keys` not already in flight. Re-enqueuing a
    /// key already running is a no-op.
    pub fn enqueue(&self, keys: &[String]) {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let mut live = self.shared.live_keys.lock().unwrap();
        live.retain(|key| wanted.contains(key.as_str()));

        for key in keys {
            if !live.contains(key) {
                live.insert(key.clone());
                let _ = self.sender.send(Message::Run(key.clone()));
            }
        }
    }

    /// Blocks until `key`'s task completes or is cancelled; returns
    /// immediately if `key` is not currently known.
    pub fn wait_for(&self, key: &str) {
        let live = self.shared.live_keys.lock().unwrap();
        let _unused = self
            .shared
            .done
            .wait_while(live, |live| live.contains(key))
            .unwrap();
    }
}

impl Drop for DecompressScheduler {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Message>>>, shared: Arc<Shared>, store: Arc<ArtifactStore>) {
    loop {
        let message = {
            let receiver = receiver.lock().unwrap();
            receiver.recv()
        };
        let Ok(message) = message else { break };
        let key = match message {
            Message::Shutdown => break,
            Message::Run(key) => key,
        };

        let still_wanted = shared.live_keys.lock().unwrap().contains(&key);
        if still_wanted {
            if let Err(error) = store.extract(&key, None) {
                warn!(commit = %key, %error, "background decompress failed");
            }
        }

        shared.live_keys.lock().unwrap().remove(&key);
        shared.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_unknown_key_returns_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(tmp.path()));
        store.init().unwrap();
        let scheduler = DecompressScheduler::new(store, 1);
        scheduler.wait_for("never-enqueued");
    }

    #[test]
    fn enqueue_then_wait_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(tmp.path()));
        store.init().unwrap();
        let scheduler = DecompressScheduler::new(store, 2);
        let commit = "a".repeat(40);
        scheduler.enqueue(&[commit.clone()]);
        scheduler.wait_for(&commit);
    }
}
