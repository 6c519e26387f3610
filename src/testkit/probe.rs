//! Readiness check that answers on demand.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ProbeError;
use crate::runtime::probe::StatusCheck;

/// Fails every attempt until [`set_ready`](Self::set_ready) flips it.
#[derive(Default)]
pub struct ScriptedCheck {
    ready: AtomicBool,
    attempts: AtomicU32,
}

impl ScriptedCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusCheck for ScriptedCheck {
    async fn check_status(&self, _host: &str, _port: u16) -> Result<Value, ProbeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.ready.load(Ordering::SeqCst) {
            Ok(json!({ "players": { "online": 0, "max": 20 } }))
        } else {
            Err(ProbeError::ConnectionClosed)
        }
    }
}
