//! Shared test fixtures
//!
//! `ScriptedFetcher` plays the part of the host: each load for a chunk pops
//! the next scripted behaviour for that chunk and acts it out against the
//! intake the runtime is attached to.

#![allow(dead_code)]

use async_trait::async_trait;
use chunk_runtime::chunk::{ChunkFetcher, LoadEvent, LoadRequest};
use chunk_runtime::{ChunkDefinition, ChunkId, ChunkIntake, ChunkRuntime, RuntimeConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a single load of a chunk does
#[derive(Clone)]
pub enum Script {
    /// Push the definition, then signal `load`
    Register(ChunkDefinition),
    /// Wait, push the definition, then signal `load`
    Delayed(Duration, ChunkDefinition),
    /// Signal `load` without registering anything
    LoadOnly,
    /// Signal an error event of the given kind
    Fail(String),
    /// Never signal
    Hang,
}

pub struct ScriptedFetcher {
    intake: ChunkIntake,
    scripts: Mutex<HashMap<ChunkId, VecDeque<Script>>>,
    requests: Mutex<Vec<LoadRequest>>,
}

impl ScriptedFetcher {
    pub fn new(intake: ChunkIntake) -> Arc<Self> {
        Arc::new(Self {
            intake,
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue the behaviour of the next load of `id`
    pub fn script(&self, id: impl Into<ChunkId>, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(id.into())
            .or_default()
            .push_back(script);
    }

    /// Loads that reached the fetcher
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self, id: &ChunkId) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Script::LoadOnly)
    }
}

#[async_trait]
impl ChunkFetcher for ScriptedFetcher {
    async fn load(&self, request: LoadRequest) -> LoadEvent {
        self.requests.lock().unwrap().push(request.clone());
        match self.next_script(&request.chunk_id) {
            Script::Register(definition) => {
                let _ = self.intake.push(definition);
                LoadEvent::Load
            }
            Script::Delayed(delay, definition) => {
                tokio::time::sleep(delay).await;
                let _ = self.intake.push(definition);
                LoadEvent::Load
            }
            Script::LoadOnly => LoadEvent::Load,
            Script::Fail(kind) => LoadEvent::Error(kind),
            Script::Hang => std::future::pending().await,
        }
    }
}

/// Install a runtime on `intake` backed by `fetcher`
pub fn install(intake: &ChunkIntake, fetcher: &Arc<ScriptedFetcher>, config: RuntimeConfig) -> ChunkRuntime {
    let fetcher: Arc<dyn ChunkFetcher> = Arc::clone(fetcher) as Arc<dyn ChunkFetcher>;
    ChunkRuntime::install(config, fetcher, intake.clone()).unwrap()
}
