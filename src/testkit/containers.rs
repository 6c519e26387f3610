//! Scripted [`ContainerService`] for testing.
//!
//! - Every method bumps a call counter, so tests can assert "no RPC was made".
//! - Start and stop pop scripted results (default `Ok`).
//! - `status_stream()` hands out a channel-backed stream; the test pushes
//!   events with [`ScriptedContainers::push`] and ends the stream with
//!   [`ScriptedContainers::end_stream`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::domain::{ContainerStatus, NodeStats, ServerId, StatusEvent};
use crate::error::RpcError;
use crate::port::{
    ConsoleSession, ContainerService, StartContainerRequest, StartOutcome, StatusStream,
    TerminalSize,
};

type Feed = mpsc::UnboundedSender<Result<StatusEvent, RpcError>>;

/// A runner node whose answers are scripted by the test.
pub struct ScriptedContainers {
    start_results: Mutex<VecDeque<Result<StartOutcome, RpcError>>>,
    stop_results: Mutex<VecDeque<Result<(), RpcError>>>,
    stats: Mutex<Result<NodeStats, RpcError>>,
    running: Mutex<Result<Vec<ServerId>, RpcError>>,
    /// Remaining `status_stream()` calls that fail.
    stream_failures: AtomicU32,
    /// Every call fails with a transport error.
    unreachable: bool,
    feed: Mutex<Option<Feed>>,

    starts: Mutex<Vec<StartContainerRequest>>,
    stops: Mutex<Vec<ServerId>>,
    commands: Mutex<Vec<(ServerId, String)>>,

    start_count: AtomicU32,
    stop_count: AtomicU32,
    stats_count: AtomicU32,
    running_count: AtomicU32,
    stream_count: AtomicU32,
}

impl Default for ScriptedContainers {
    fn default() -> Self {
        Self {
            start_results: Mutex::new(VecDeque::new()),
            stop_results: Mutex::new(VecDeque::new()),
            stats: Mutex::new(Ok(NodeStats::default())),
            running: Mutex::new(Ok(Vec::new())),
            stream_failures: AtomicU32::new(0),
            unreachable: false,
            feed: Mutex::new(None),
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            start_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
            stats_count: AtomicU32::new(0),
            running_count: AtomicU32::new(0),
            stream_count: AtomicU32::new(0),
        }
    }
}

fn transport() -> RpcError {
    RpcError::Transport("connection refused".into())
}

impl ScriptedContainers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node that cannot be reached at all.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_stats(self, stats: NodeStats) -> Self {
        *self.stats.lock().unwrap() = Ok(stats);
        self
    }

    pub fn with_start_results(self, results: Vec<Result<StartOutcome, RpcError>>) -> Self {
        *self.start_results.lock().unwrap() = results.into();
        self
    }

    pub fn with_stop_results(self, results: Vec<Result<(), RpcError>>) -> Self {
        *self.stop_results.lock().unwrap() = results.into();
        self
    }

    /// Fail the next `n` status stream connects.
    pub fn with_stream_failures(self, n: u32) -> Self {
        self.stream_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn set_running(&self, ids: Vec<ServerId>) {
        *self.running.lock().unwrap() = Ok(ids);
    }

    pub fn fail_running(&self, err: RpcError) {
        *self.running.lock().unwrap() = Err(err);
    }

    // ---- Status feed ----

    /// Push one event into the open status stream. Returns `false` when no
    /// stream is open.
    pub fn push(&self, event: StatusEvent) -> bool {
        self.feed
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(event)).is_ok())
    }

    pub fn push_change(&self, id: u64, status: ContainerStatus) -> bool {
        self.push(StatusEvent::change(ServerId::new(id), status))
    }

    /// Push an error item into the open status stream.
    pub fn push_error(&self, err: RpcError) -> bool {
        self.feed
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Close the open status stream.
    pub fn end_stream(&self) {
        self.feed.lock().unwrap().take();
    }

    /// Wait until `status_stream()` has been called at least `n` times.
    pub async fn wait_for_streams(&self, n: u32) {
        while self.stream_count() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // ---- Recorded calls ----

    pub fn starts(&self) -> Vec<StartContainerRequest> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<ServerId> {
        self.stops.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<(ServerId, String)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::SeqCst)
    }

    pub fn stats_count(&self) -> u32 {
        self.stats_count.load(Ordering::SeqCst)
    }

    pub fn running_count(&self) -> u32 {
        self.running_count.load(Ordering::SeqCst)
    }

    pub fn stream_count(&self) -> u32 {
        self.stream_count.load(Ordering::SeqCst)
    }

    /// Total RPCs made, of any kind.
    pub fn total_calls(&self) -> u32 {
        self.start_count()
            + self.stop_count()
            + self.stats_count()
            + self.running_count()
            + self.stream_count()
    }
}

#[async_trait]
impl ContainerService for ScriptedContainers {
    async fn start_container(
        &self,
        request: &StartContainerRequest,
    ) -> Result<StartOutcome, RpcError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(transport());
        }
        self.starts.lock().unwrap().push(request.clone());
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(StartOutcome::Accepted))
    }

    async fn stop_container(&self, server_id: ServerId) -> Result<(), RpcError> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(transport());
        }
        self.stops.lock().unwrap().push(server_id);
        self.stop_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn running_containers(&self) -> Result<Vec<ServerId>, RpcError> {
        self.running_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(transport());
        }
        self.running.lock().unwrap().clone()
    }

    async fn node_stats(&self) -> Result<NodeStats, RpcError> {
        self.stats_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(transport());
        }
        self.stats.lock().unwrap().clone()
    }

    async fn status_stream(&self) -> Result<StatusStream, RpcError> {
        self.stream_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(transport());
        }
        let failing = self
            .stream_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(transport());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().unwrap() = Some(tx);
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(events.boxed())
    }

    async fn attach_console(
        &self,
        _server_id: ServerId,
        _size: TerminalSize,
    ) -> Result<ConsoleSession, RpcError> {
        if self.unreachable {
            return Err(transport());
        }
        Ok(echo_console())
    }

    async fn exec_command(&self, server_id: ServerId, command: &str) -> Result<(), RpcError> {
        if self.unreachable {
            return Err(transport());
        }
        self.commands
            .lock()
            .unwrap()
            .push((server_id, command.to_string()));
        Ok(())
    }
}

/// A console that echoes every input chunk back.
pub fn echo_console() -> ConsoleSession {
    let (input, mut input_rx) = mpsc::channel::<Vec<u8>>(16);
    let (output_tx, output) = mpsc::channel(16);
    tokio::spawn(async move {
        while let Some(chunk) = input_rx.recv().await {
            if output_tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    ConsoleSession { input, output }
}
