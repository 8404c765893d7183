//! Per-request handler context: deadline, metadata, and cancellation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;

/// Case-insensitive request/response metadata (header-shaped multimap).
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Metadata {
        Metadata::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value for a key, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fires the paired [`Cancellation`] when the transport goes away.
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

/// Observed by handlers through [`Context::cancelled`].
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// A linked cancellation pair; the gateway keeps the handle.
pub fn cancellation() -> (CancellationHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, Cancellation { rx })
}

impl CancellationHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired handle fires. A dropped handle counts as
    /// cancelled: the request is being torn down either way.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug, Default)]
struct ResponseMeta {
    headers: Metadata,
    trailers: Metadata,
}

#[derive(Debug)]
struct ContextInner {
    deadline: Option<Instant>,
    metadata: Metadata,
    response: Mutex<ResponseMeta>,
    cancellation: Option<Cancellation>,
}

/// The context passed to every handler invocation.
///
/// Created on handler entry and destroyed on response flush. Cheap to
/// clone; clones share the response metadata staging area.
#[derive(Clone, Debug)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(
        deadline: Option<Instant>,
        metadata: Metadata,
        cancellation: Option<Cancellation>,
    ) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                deadline,
                metadata,
                response: Mutex::new(ResponseMeta::default()),
                cancellation,
            }),
        }
    }

    /// A context with no deadline, metadata, or cancellation; for tests and
    /// direct handler invocation.
    pub fn background() -> Context {
        Context::new(None, Metadata::new(), None)
    }

    /// Deadline derived from `grpc-timeout` / `connect-timeout-ms`, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Inbound request metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .cancellation
            .as_ref()
            .map(Cancellation::is_cancelled)
            .unwrap_or(false)
    }

    /// Resolves when the peer disconnects or the request is cancelled.
    /// Never resolves for a context without a cancellation signal.
    pub async fn cancelled(&self) {
        match self.inner.cancellation.as_ref() {
            Some(cancellation) => cancellation.cancelled().await,
            None => std::future::pending().await,
        }
    }

    /// Stage a response header.
    pub fn set_header(&self, key: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .response
            .lock()
            .expect("response metadata lock poisoned")
            .headers
            .insert(key, value);
    }

    /// Stage a response trailer (gRPC and gRPC-Web only).
    pub fn set_trailer(&self, key: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .response
            .lock()
            .expect("response metadata lock poisoned")
            .trailers
            .insert(key, value);
    }

    /// Drain staged response metadata; called by the gateway on flush.
    pub fn take_response_metadata(&self) -> (Metadata, Metadata) {
        let mut staged = self
            .inner
            .response
            .lock()
            .expect("response metadata lock poisoned");
        let meta = std::mem::take(&mut *staged);
        (meta.headers, meta.trailers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_case_insensitive() {
        let mut md = Metadata::new();
        md.insert("X-Request-Id", "abc");
        md.insert("x-request-id", "def");
        assert_eq!(md.get("X-REQUEST-ID"), Some("abc"));
        assert_eq!(md.get_all("x-request-id"), ["abc", "def"]);
    }

    #[tokio::test]
    async fn cancellation_fires_observers() {
        let (handle, signal) = cancellation();
        let ctx = Context::new(None, Metadata::new(), Some(signal));
        assert!(!ctx.is_cancelled());
        handle.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn response_metadata_drains_once() {
        let ctx = Context::background();
        ctx.set_header("cache-control", "no-store");
        ctx.set_trailer("x-cost", "3");
        let (headers, trailers) = ctx.take_response_metadata();
        assert_eq!(headers.get("cache-control"), Some("no-store"));
        assert_eq!(trailers.get("x-cost"), Some("3"));
        let (headers, _) = ctx.take_response_metadata();
        assert!(headers.is_empty());
    }
}
