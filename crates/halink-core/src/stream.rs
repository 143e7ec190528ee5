// ── Entity state changes ──
//
// Turns the entity collection's snapshot channel into a stream of
// per-entity state transitions, so consumers see "light.kitchen went
// off -> on" instead of whole snapshots.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Entity;

type Snapshot = Arc<Vec<Arc<Entity>>>;

/// One entity whose `state` string differs from what was last seen.
#[derive(Debug, Clone)]
pub struct EntityChange {
    pub entity: Arc<Entity>,
    /// `None` when the entity was not in the mirror before.
    pub previous: Option<String>,
}

/// Stream of [`EntityChange`]s, optionally limited to a set of entity ids.
///
/// Attribute-only updates are not reported. Entities that disappear from
/// the mirror (a cold start replacing everything) are forgotten silently.
pub struct EntityChanges {
    snapshots: WatchStream<Snapshot>,
    seen: HashMap<String, String>,
    only: Option<HashSet<String>>,
    pending: VecDeque<EntityChange>,
}

impl EntityChanges {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>, only: &[String]) -> Self {
        let seen = receiver
            .borrow()
            .iter()
            .map(|e| (e.entity_id.clone(), e.state.clone()))
            .collect();
        Self {
            snapshots: WatchStream::from_changes(receiver),
            seen,
            only: (!only.is_empty()).then(|| only.iter().cloned().collect()),
            pending: VecDeque::new(),
        }
    }

    /// Number of entities known when the stream was created or last
    /// advanced.
    pub fn known(&self) -> usize {
        self.seen.len()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn next_change(&mut self) -> Option<EntityChange> {
        self.next().await
    }

    fn wanted(&self, entity_id: &str) -> bool {
        self.only.as_ref().is_none_or(|ids| ids.contains(entity_id))
    }

    fn absorb(&mut self, snapshot: &Snapshot) {
        let mut present = HashSet::with_capacity(snapshot.len());
        for entity in snapshot.iter() {
            present.insert(entity.entity_id.as_str());
            let previous = self.seen.get(&entity.entity_id);
            if previous.is_some_and(|p| *p == entity.state) {
                continue;
            }
            let previous = self
                .seen
                .insert(entity.entity_id.clone(), entity.state.clone());
            if self.wanted(&entity.entity_id) {
                self.pending.push_back(EntityChange {
                    entity: Arc::clone(entity),
                    previous,
                });
            }
        }
        self.seen.retain(|id, _| present.contains(id.as_str()));
    }
}

impl Stream for EntityChanges {
    type Item = EntityChange;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(change) = this.pending.pop_front() {
                return Poll::Ready(Some(change));
            }
            match Pin::new(&mut this.snapshots).poll_next(cx) {
                Poll::Ready(Some(snapshot)) => this.absorb(&snapshot),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
