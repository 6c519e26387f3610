//! In-memory [`ContainerEngine`] for relay tests.
//!
//! Containers live in a map. Starting one emits an engine `Start` event on
//! the open feed; stopping one removes it and emits `Destroy`, like an
//! auto-removed container would.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::domain::ContainerStats;
use crate::error::EngineError;
use crate::port::{ConsoleSession, TerminalSize};
use crate::relay::{
    ContainerEngine, ContainerSpec, EngineAction, EngineEvent, EngineEventStream, HostMemory,
    StatsStream,
};

use super::containers::echo_console;

struct Container {
    spec: ContainerSpec,
    running: bool,
}

type Feed = mpsc::UnboundedSender<Result<EngineEvent, EngineError>>;

pub struct MemoryEngine {
    memory: Mutex<HostMemory>,
    containers: Mutex<BTreeMap<String, Container>>,
    feed: Mutex<Option<Feed>>,
    stdin: Mutex<Vec<(String, Vec<u8>)>>,
    fail_pull: AtomicBool,
    fail_create: AtomicBool,
    fail_stop: AtomicBool,
    next_id: AtomicU32,
    created: AtomicU32,
    pulled: AtomicU32,
    feeds_opened: AtomicU32,
}

impl MemoryEngine {
    /// Engine on a host with `total` bytes of memory, `free` of them free.
    pub fn new(total: u64, free: u64) -> Self {
        Self {
            memory: Mutex::new(HostMemory { total, free }),
            containers: Mutex::new(BTreeMap::new()),
            feed: Mutex::new(None),
            stdin: Mutex::new(Vec::new()),
            fail_pull: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            next_id: AtomicU32::new(0),
            created: AtomicU32::new(0),
            pulled: AtomicU32::new(0),
            feeds_opened: AtomicU32::new(0),
        }
    }

    pub fn fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn pulled(&self) -> u32 {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn feeds_opened(&self) -> u32 {
        self.feeds_opened.load(Ordering::SeqCst)
    }

    /// Spec of the container named `name`, if it exists.
    pub fn spec_named(&self, name: &str) -> Option<ContainerSpec> {
        self.containers
            .lock()
            .unwrap()
            .values()
            .find(|c| c.spec.name == name)
            .map(|c| c.spec.clone())
    }

    pub fn stdin(&self) -> Vec<(String, Vec<u8>)> {
        self.stdin.lock().unwrap().clone()
    }

    /// Close the open event feed.
    pub fn end_feed(&self) {
        self.feed.lock().unwrap().take();
    }

    /// Wait until the event feed has been opened at least `n` times.
    pub async fn wait_for_feeds(&self, n: u32) {
        while self.feeds_opened() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn emit(&self, action: EngineAction, container_id: &str, spec: &ContainerSpec) {
        if let Some(tx) = self.feed.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(EngineEvent {
                action,
                container_id: container_id.to_string(),
                labels: spec.labels.clone(),
            }));
        }
    }
}

fn failure(reason: &str) -> EngineError {
    EngineError::Request(reason.to_string())
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    async fn host_memory(&self) -> Result<HostMemory, EngineError> {
        Ok(*self.memory.lock().unwrap())
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.pulled.fetch_add(1, Ordering::SeqCst);
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(EngineError::Pull(format!("{image}: manifest unknown")));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(failure("name already in use"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let id = format!("c{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().unwrap().insert(
            id.clone(),
            Container {
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError> {
        let spec = {
            let mut containers = self.containers.lock().unwrap();
            let container = containers
                .get_mut(container_id)
                .ok_or_else(|| failure("no such container"))?;
            container.running = true;
            container.spec.clone()
        };
        self.emit(EngineAction::Start, container_id, &spec);
        Ok(())
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), EngineError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(failure("stop timed out"));
        }
        let removed = self.containers.lock().unwrap().remove(container_id);
        let container = removed.ok_or_else(|| failure("no such container"))?;
        self.emit(EngineAction::Destroy, container_id, &container.spec);
        Ok(())
    }

    async fn list_by_label(
        &self,
        label: &str,
        value: Option<&str>,
    ) -> Result<Vec<(String, String)>, EngineError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c.running)
            .filter_map(|(id, c)| {
                let found = c.spec.labels.get(label)?;
                match value {
                    Some(wanted) if wanted != found => None,
                    _ => Some((id.clone(), found.clone())),
                }
            })
            .collect())
    }

    async fn events(&self) -> Result<EngineEventStream, EngineError> {
        self.feeds_opened.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().unwrap() = Some(tx);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }

    async fn stats(&self, _container_id: &str) -> Result<StatsStream, EngineError> {
        let sample = ContainerStats {
            cpu: 1_000,
            ram: 512_000_000,
        };
        Ok(stream::iter(vec![Ok(sample)])
            .chain(stream::pending())
            .boxed())
    }

    async fn attach(
        &self,
        _container_id: &str,
        _size: TerminalSize,
    ) -> Result<ConsoleSession, EngineError> {
        Ok(echo_console())
    }

    async fn write_stdin(&self, container_id: &str, data: &[u8]) -> Result<(), EngineError> {
        self.stdin
            .lock()
            .unwrap()
            .push((container_id.to_string(), data.to_vec()));
        Ok(())
    }
}
