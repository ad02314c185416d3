//! Storage queue: an asynchronous, bounded-concurrency dispatcher that
//! executes PUT/GET/DELETE operations against pooled backend instances,
//! one OS thread per in-flight operation, coordinated with
//! `parking_lot::{Mutex, Condvar}`.

use crate::backend::{Backend, BackendResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique id assigned to every enqueued operation, used to track queue
/// membership (operations themselves are not required to be `Hash`/`Eq`).
type OpId = u64;

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(0);

fn next_op_id() -> OpId {
    NEXT_OP_ID.fetch_add(1, Ordering::Relaxed)
}

/// What to do against a backend: PUT, GET, or DELETE a named object.
enum OpKind {
    Put { name: String, data: Vec<u8> },
    Get { name: String },
    Delete { name: String },
}

/// The result value of a completed, successful operation.
#[derive(Debug, Clone)]
pub enum OpValue {
    Bytes(Vec<u8>),
    Unit,
}

impl OpValue {
    /// # Panics
    /// Panics if this is not a `Bytes` value — callers know statically
    /// which variant a GET vs. PUT/DELETE produces.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OpValue::Bytes(b) => b,
            OpValue::Unit => panic!("into_bytes() called on a unit operation result"),
        }
    }
}

type Callback = Box<dyn FnOnce(OpValue) + Send>;

/// A storage operation: PUT/GET/DELETE plus an optional completion
/// callback, invoked synchronously on the worker thread when the
/// operation succeeds. `enqueue` takes ownership, so results are observed
/// through the callback rather than by polling the operation afterward.
pub struct StorageOperation {
    id: OpId,
    kind: OpKind,
    callback: Option<Callback>,
}

impl StorageOperation {
    #[must_use]
    pub fn put(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(OpKind::Put { name: name.into(), data }, None)
    }

    #[must_use]
    pub fn put_with_callback(
        name: impl Into<String>,
        data: Vec<u8>,
        callback: impl FnOnce(OpValue) + Send + 'static,
    ) -> Self {
        Self::new(OpKind::Put { name: name.into(), data }, Some(Box::new(callback)))
    }

    #[must_use]
    pub fn get(name: impl Into<String>) -> Self {
        Self::new(OpKind::Get { name: name.into() }, None)
    }

    #[must_use]
    pub fn get_with_callback(
        name: impl Into<String>,
        callback: impl FnOnce(OpValue) + Send + 'static,
    ) -> Self {
        Self::new(OpKind::Get { name: name.into() }, Some(Box::new(callback)))
    }

    #[must_use]
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(OpKind::Delete { name: name.into() }, None)
    }

    fn new(kind: OpKind, callback: Option<Callback>) -> Self {
        Self { id: next_op_id(), kind, callback }
    }

    fn mnemonic(&self) -> &'static str {
        match self.kind {
            OpKind::Put { .. } => "PUT",
            OpKind::Get { .. } => "GET",
            OpKind::Delete { .. } => "DEL",
        }
    }

    fn name(&self) -> &str {
        match &self.kind {
            OpKind::Put { name, .. } | OpKind::Get { name } | OpKind::Delete { name } => name,
        }
    }

    fn execute(&self, backend: &mut dyn Backend) -> BackendResult<OpValue> {
        match &self.kind {
            OpKind::Put { name, data } => backend.put(name, data).map(|()| OpValue::Unit),
            OpKind::Get { name } => backend.get(name).map(OpValue::Bytes),
            OpKind::Delete { name } => backend.delete(name).map(|()| OpValue::Unit),
        }
    }

}

/// Raised by [`StorageQueue::wait`]/[`StorageQueue::enqueue`] once the
/// queue has been poisoned by a failed operation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct OperationHasFailed(pub String);

struct Shared {
    ops: Mutex<HashSet<OpId>>,
    pool: Mutex<Vec<Box<dyn Backend>>>,
    cond: Condvar,
    failed: Mutex<Option<String>>,
}

/// Bounded-concurrency dispatcher mediating between producer code and a
/// pool of backend instances.
///
/// Constructed with a backend factory and a maximum concurrency `N`; at
/// most `N` operations run at once, with idle backends reused from a pool
/// before the factory is called again.
pub struct StorageQueue {
    factory: Box<dyn Fn() -> Box<dyn Backend> + Send + Sync>,
    max_conc: usize,
    shared: Arc<Shared>,
}

impl StorageQueue {
    #[must_use]
    pub fn new(factory: impl Fn() -> Box<dyn Backend> + Send + Sync + 'static, max_conc: usize) -> Self {
        assert!(max_conc > 0, "max_conc must be at least 1");
        Self {
            factory: Box::new(factory),
            max_conc,
            shared: Arc::new(Shared {
                ops: Mutex::new(HashSet::new()),
                pool: Mutex::new(Vec::new()),
                cond: Condvar::new(),
                failed: Mutex::new(None),
            }),
        }
    }

    /// Enqueue an operation for execution as soon as a slot is free.
    ///
    /// # Errors
    /// Returns [`OperationHasFailed`] immediately if a previously enqueued
    /// operation has already failed; does not enqueue in that case.
    pub fn enqueue(&self, op: StorageOperation) -> Result<(), OperationHasFailed> {
        if let Some(reason) = self.shared.failed.lock().clone() {
            return Err(OperationHasFailed(reason));
        }

        let mut ops = self.shared.ops.lock();
        while ops.len() >= self.max_conc {
            self.shared.cond.wait(&mut ops);
        }
        ops.insert(op.id);
        drop(ops);

        let backend = {
            let mut pool = self.shared.pool.lock();
            pool.pop().unwrap_or_else(|| (self.factory)())
        };

        let shared = self.shared.clone();
        let op_id = op.id;
        std::thread::spawn(move || worker(shared, op, backend));
        let _ = op_id;
        Ok(())
    }

    /// Wait for all outstanding operations to complete.
    ///
    /// # Errors
    /// Returns [`OperationHasFailed`] if any operation submitted before or
    /// during this wait has failed.
    pub fn wait(&self) -> Result<(), OperationHasFailed> {
        let mut ops = self.shared.ops.lock();
        while !ops.is_empty() {
            self.shared.cond.wait(&mut ops);
        }
        drop(ops);
        if let Some(reason) = self.shared.failed.lock().clone() {
            return Err(OperationHasFailed(reason));
        }
        Ok(())
    }

    /// Semantically a [`StorageQueue::wait`]: every operation enqueued
    /// before this call completes before any operation enqueued after it
    /// starts, from the caller's point of view (the queue itself does not
    /// reorder across the barrier because nothing is in flight when it
    /// returns).
    ///
    /// # Errors
    /// As [`StorageQueue::wait`].
    pub fn barrier(&self) -> Result<(), OperationHasFailed> {
        self.wait()
    }

    /// Number of operations currently in flight. Exposed for tests that
    /// observe backpressure.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.ops.lock().len()
    }
}

fn worker(shared: Arc<Shared>, op: StorageOperation, mut backend: Box<dyn Backend>) {
    log::debug!("performing operation: {} {}", op.mnemonic(), op.name());
    let outcome = op.execute(backend.as_mut());

    match outcome {
        Ok(value) => {
            if let Some(callback) = op.callback {
                // Run synchronously on the worker thread, before the
                // backend is returned to the pool: a blocking callback
                // keeps this slot occupied, which is the mechanism the
                // Materializer uses for backpressure (see
                // `crate::materialize`).
                callback(value);
            }
        }
        Err(e) => {
            log::error!("operation failed: {} {}: {e}", op.mnemonic(), op.name());
            let mut failed = shared.failed.lock();
            if failed.is_none() {
                *failed = Some(format!("operation {} {} failed: {e}", op.mnemonic(), op.name()));
            }
        }
    }

    shared.pool.lock().push(backend);
    shared.ops.lock().remove(&op.id);
    shared.cond.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering as AOrdering};
    use std::time::{Duration, Instant};

    fn mem_queue(label: &str, max_conc: usize) -> StorageQueue {
        let label = label.to_string();
        StorageQueue::new(move || Box::new(MemoryBackend::new(&label)) as Box<dyn Backend>, max_conc)
    }

    #[test]
    fn put_then_get_round_trips() {
        let q = mem_queue("test-queue-put-get", 2);
        q.enqueue(StorageOperation::put("a", b"hi".to_vec())).unwrap();
        q.wait().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let get = StorageOperation::get_with_callback("a", move |v| {
            let _ = tx.send(v.into_bytes());
        });
        q.enqueue(get).unwrap();
        q.wait().unwrap();
        assert_eq!(rx.recv().unwrap(), b"hi".to_vec());
    }

    #[test]
    fn failure_poisons_queue() {
        let q = mem_queue("test-queue-failure", 2);
        // GET of a name that was never put -> NotFound -> op fails.
        q.enqueue(StorageOperation::get("missing")).unwrap();
        let err = q.wait().unwrap_err();
        assert!(!err.0.is_empty());
        let err2 = q.enqueue(StorageOperation::put("x", b"y".to_vec())).unwrap_err();
        assert!(!err2.0.is_empty());
    }

    #[test]
    fn backpressure_limits_concurrency() {
        let q = mem_queue("test-queue-backpressure", 3);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        for i in 0..9 {
            let active = active.clone();
            let max_seen = max_seen.clone();
            let op = StorageOperation::put_with_callback(format!("k{i}"), b"v".to_vec(), move |_| {
                let now = active.fetch_add(1, AOrdering::SeqCst) + 1;
                max_seen.fetch_max(now, AOrdering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                active.fetch_sub(1, AOrdering::SeqCst);
            });
            q.enqueue(op).unwrap();
        }
        q.wait().unwrap();
        let elapsed = start.elapsed();
        assert!(max_seen.load(AOrdering::SeqCst) <= 3, "saw {} concurrent callbacks", max_seen.load(AOrdering::SeqCst));
        // ceil(9/3) * 30ms = 90ms; allow generous slack for CI jitter.
        assert!(elapsed >= Duration::from_millis(80), "completed suspiciously fast: {elapsed:?}");
    }

    #[test]
    fn in_flight_operations_complete_after_failure() {
        let q = mem_queue("test-queue-inflight-after-failure", 4);
        let done = Arc::new(AtomicUsize::new(0));
        q.enqueue(StorageOperation::get("nope")).unwrap();
        for i in 0..3 {
            let done = done.clone();
            q.enqueue(StorageOperation::put_with_callback(format!("k{i}"), b"v".to_vec(), move |_| {
                done.fetch_add(1, AOrdering::SeqCst);
            }))
            .unwrap();
        }
        let _ = q.wait();
        assert_eq!(done.load(AOrdering::SeqCst), 3);
    }
}
