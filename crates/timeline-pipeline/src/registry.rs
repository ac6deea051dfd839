//! Refresh registry.
//!
//! Each logical stream (an incident group view, the alerts table, ...) has
//! at most one in-flight refresh. Starting a new refresh supersedes the
//! previous one: its task is aborted and any result it still delivers is
//! discarded. The registry is owned by the session that drives refreshes;
//! dropping it aborts everything still running.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Identifies one refresh of one stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshTicket {
    stream: String,
    generation: u64,
}

impl RefreshTicket {
    /// Stream this ticket belongs to
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Monotonic generation number
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct StreamEntry {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl StreamEntry {
    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Registry of in-flight refreshes keyed by stream name
#[derive(Debug, Default)]
pub struct RefreshRegistry {
    streams: DashMap<String, StreamEntry>,
    next_generation: AtomicU64,
}

impl RefreshRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh, superseding whatever the stream had in flight
    pub fn begin(&self, stream: &str) -> RefreshTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut entry = self.streams.entry(stream.to_string()).or_default();
        if entry.task.is_some() {
            debug!(stream, superseded = entry.generation, "Aborting superseded refresh");
        }
        entry.abort();
        entry.generation = generation;

        RefreshTicket {
            stream: stream.to_string(),
            generation,
        }
    }

    /// Attach the task doing the work for `ticket`.
    ///
    /// A task for a ticket that is already stale is aborted immediately. A
    /// task that already finished (and so may have accepted its result) is
    /// not stored.
    pub fn attach(&self, ticket: &RefreshTicket, task: JoinHandle<()>) {
        match self.streams.get_mut(&ticket.stream) {
            Some(mut entry) if entry.generation == ticket.generation => {
                entry.abort();
                if !task.is_finished() {
                    entry.task = Some(task);
                }
            }
            _ => {
                debug!(stream = %ticket.stream, generation = ticket.generation, "Attach to stale ticket");
                task.abort();
            }
        }
    }

    /// Begin a refresh and run `work` on the tokio runtime under it
    pub fn spawn<F>(&self, stream: &str, work: F) -> RefreshTicket
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.begin(stream);
        self.attach(&ticket, tokio::spawn(work));
        ticket
    }

    /// Whether `ticket` is still the latest refresh of its stream
    pub fn is_current(&self, ticket: &RefreshTicket) -> bool {
        self.streams
            .get(&ticket.stream)
            .map(|entry| entry.generation == ticket.generation)
            .unwrap_or(false)
    }

    /// Hand back `result` only if `ticket` is still current.
    ///
    /// A stale result is dropped. Accepting completes the refresh, so the
    /// stream no longer holds a task handle.
    pub fn accept<T>(&self, ticket: &RefreshTicket, result: T) -> Option<T> {
        match self.streams.get_mut(&ticket.stream) {
            Some(mut entry) if entry.generation == ticket.generation => {
                entry.task = None;
                Some(result)
            }
            _ => {
                warn!(
                    stream = %ticket.stream,
                    generation = ticket.generation,
                    "Discarding stale refresh result"
                );
                None
            }
        }
    }

    /// Abort and forget one stream
    pub fn cancel(&self, stream: &str) {
        if let Some((_, mut entry)) = self.streams.remove(stream) {
            entry.abort();
        }
    }

    /// Abort every stream
    pub fn clear(&self) {
        for mut entry in self.streams.iter_mut() {
            entry.abort();
        }
        self.streams.clear();
    }

    /// Number of streams with a refresh in flight
    pub fn in_flight(&self) -> usize {
        self.streams.iter().filter(|e| e.task.is_some()).count()
    }
}

impl Drop for RefreshRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// A task that never finishes on its own; `rx` errors once it is dropped
    fn parked() -> (impl Future<Output = ()> + Send + 'static, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel::<()>();
        let work = async move {
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        };
        (work, rx)
    }

    #[test]
    fn test_newer_ticket_supersedes() {
        let registry = RefreshRegistry::new();
        let first = registry.begin("group:g-1");
        let second = registry.begin("group:g-1");

        assert!(second.generation() > first.generation());
        assert!(!registry.is_current(&first));
        assert!(registry.is_current(&second));
        assert_eq!(registry.accept(&first, "stale"), None);
        assert_eq!(registry.accept(&second, "fresh"), Some("fresh"));
    }

    #[test]
    fn test_streams_are_independent() {
        let registry = RefreshRegistry::new();
        let incidents = registry.begin("incidents");
        let _alerts = registry.begin("alerts");

        assert!(registry.is_current(&incidents));
    }

    #[test]
    fn test_cancelled_stream_rejects_results() {
        let registry = RefreshRegistry::new();
        let ticket = registry.begin("alerts");
        registry.cancel("alerts");

        assert!(!registry.is_current(&ticket));
        assert_eq!(registry.accept(&ticket, 1), None);
    }

    #[tokio::test]
    async fn test_superseded_task_is_aborted() {
        let registry = RefreshRegistry::new();
        let (work, rx) = parked();
        registry.spawn("group:g-1", work);
        assert_eq!(registry.in_flight(), 1);

        let (next, _next_rx) = parked();
        registry.spawn("group:g-1", next);

        assert!(rx.await.is_err());
        assert_eq!(registry.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_attach_to_stale_ticket_aborts() {
        let registry = RefreshRegistry::new();
        let stale = registry.begin("table");
        let _current = registry.begin("table");

        let (work, rx) = parked();
        registry.attach(&stale, tokio::spawn(work));

        assert!(rx.await.is_err());
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_attach_after_early_accept_is_not_in_flight() {
        let registry = std::sync::Arc::new(RefreshRegistry::new());
        let ticket = registry.begin("table");

        let task = tokio::spawn({
            let registry = registry.clone();
            let ticket = ticket.clone();
            async move {
                assert_eq!(registry.accept(&ticket, "rows"), Some("rows"));
            }
        });
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }

        registry.attach(&ticket, task);

        assert_eq!(registry.in_flight(), 0);
        assert!(registry.is_current(&ticket));
    }

    #[tokio::test]
    async fn test_drop_aborts_everything() {
        let registry = RefreshRegistry::new();
        let (a, rx_a) = parked();
        let (b, rx_b) = parked();
        registry.spawn("incidents", a);
        registry.spawn("alerts", b);

        drop(registry);

        assert!(rx_a.await.is_err());
        assert!(rx_b.await.is_err());
    }

    #[tokio::test]
    async fn test_accept_from_finished_task() {
        let registry = std::sync::Arc::new(RefreshRegistry::new());
        let (tx, rx) = oneshot::channel();

        let ticket = registry.begin("incidents");
        let worker_ticket = ticket.clone();
        let worker_registry = registry.clone();
        registry.attach(
            &ticket,
            tokio::spawn(async move {
                let _ = tx.send(worker_registry.accept(&worker_ticket, 42));
            }),
        );

        assert_eq!(rx.await.unwrap(), Some(42));
    }
}
