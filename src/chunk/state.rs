//! Per-chunk load state
//!
//! Tracks whether each chunk id is unrequested, pending (with the waiters
//! that joined the in-flight attempt) or ready. A failed attempt removes the
//! entry, returning the chunk to unrequested so a later request can retry.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::chunk::error::ChunkLoadError;
use crate::ids::ChunkId;

/// Outcome delivered to a chunk waiter
pub type ChunkOutcome = Result<(), ChunkLoadError>;

/// Completion handle held by the state table for one waiter
pub type Waiter = oneshot::Sender<ChunkOutcome>;

/// Observable state of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Unrequested,
    Pending,
    Ready,
}

enum Slot {
    Pending(Vec<Waiter>),
    Ready,
}

/// Result of asking the table for a chunk
pub enum Admission {
    /// Already ready; nothing to wait for
    Ready,
    /// Joined an in-flight attempt
    Joined(oneshot::Receiver<ChunkOutcome>),
    /// First requester; the caller must issue the load
    Start(oneshot::Receiver<ChunkOutcome>),
}

/// Chunk id → state table
#[derive(Default)]
pub struct ChunkStateTable {
    slots: Mutex<HashMap<ChunkId, Slot>>,
}

impl ChunkStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with `installed` already ready
    pub fn with_installed<I>(installed: I) -> Self
    where
        I: IntoIterator<Item = ChunkId>,
    {
        let slots = installed.into_iter().map(|id| (id, Slot::Ready)).collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    pub fn state(&self, id: &ChunkId) -> ChunkState {
        match self.lock().get(id) {
            None => ChunkState::Unrequested,
            Some(Slot::Pending(_)) => ChunkState::Pending,
            Some(Slot::Ready) => ChunkState::Ready,
        }
    }

    pub fn is_ready(&self, id: &ChunkId) -> bool {
        matches!(self.lock().get(id), Some(Slot::Ready))
    }

    /// Register interest in a chunk
    pub fn admit(&self, id: &ChunkId) -> Admission {
        let mut slots = self.lock();
        match slots.get_mut(id) {
            Some(Slot::Ready) => Admission::Ready,
            Some(Slot::Pending(waiters)) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                debug!("Chunk {} already pending, {} waiters", id, waiters.len());
                Admission::Joined(rx)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                slots.insert(id.clone(), Slot::Pending(vec![tx]));
                Admission::Start(rx)
            }
        }
    }

    /// Transition to ready, handing back any waiters to notify
    pub fn mark_ready(&self, id: &ChunkId) -> Vec<Waiter> {
        match self.lock().insert(id.clone(), Slot::Ready) {
            Some(Slot::Pending(waiters)) => waiters,
            _ => Vec::new(),
        }
    }

    /// Abandon a pending attempt
    ///
    /// Returns `None` when the chunk is not pending (for example because it
    /// registered itself before the load signal arrived).
    pub fn fail(&self, id: &ChunkId) -> Option<Vec<Waiter>> {
        let mut slots = self.lock();
        match slots.get(id) {
            Some(Slot::Pending(_)) => match slots.remove(id) {
                Some(Slot::Pending(waiters)) => Some(waiters),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn ready_chunks(&self) -> Vec<ChunkId> {
        let mut ready: Vec<ChunkId> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready))
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();
        ready
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChunkId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::error::FailureType;

    #[test]
    fn test_first_admission_starts_then_joins() {
        let table = ChunkStateTable::new();
        let id = ChunkId::from(48);
        assert!(matches!(table.admit(&id), Admission::Start(_)));
        assert!(matches!(table.admit(&id), Admission::Joined(_)));
        assert_eq!(table.state(&id), ChunkState::Pending);
    }

    #[test]
    fn test_ready_hands_back_waiters() {
        let table = ChunkStateTable::new();
        let id = ChunkId::from(64);
        let Admission::Start(mut first) = table.admit(&id) else {
            panic!("expected start");
        };
        let Admission::Joined(mut second) = table.admit(&id) else {
            panic!("expected join");
        };

        let waiters = table.mark_ready(&id);
        assert_eq!(waiters.len(), 2);
        for waiter in waiters {
            waiter.send(Ok(())).unwrap();
        }
        assert_eq!(first.try_recv().unwrap(), Ok(()));
        assert_eq!(second.try_recv().unwrap(), Ok(()));
        assert!(matches!(table.admit(&id), Admission::Ready));
    }

    #[test]
    fn test_fail_resets_to_unrequested() {
        let table = ChunkStateTable::new();
        let id = ChunkId::from(98);
        let _rx = table.admit(&id);
        let waiters = table.fail(&id).unwrap();
        assert_eq!(waiters.len(), 1);
        for waiter in waiters {
            let _ = waiter.send(Err(ChunkLoadError::new(
                id.clone(),
                FailureType::Missing,
                "/x.js",
            )));
        }
        assert_eq!(table.state(&id), ChunkState::Unrequested);
        assert!(table.fail(&id).is_none());
    }

    #[test]
    fn test_fail_ignores_ready_chunk() {
        let table = ChunkStateTable::with_installed(vec![ChunkId::from(354)]);
        assert!(table.fail(&ChunkId::from(354)).is_none());
        assert!(table.is_ready(&ChunkId::from(354)));
        assert_eq!(table.ready_chunks(), vec![ChunkId::from(354)]);
    }
}
