//! Per-document update ledger owned by one updater

use crate::error::AgentErrorKind;
use docload_interfaces::{parse_revision, Document, DocumentRevisionPair};
use rand::Rng;
use std::collections::HashMap;

/// Update progress of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocUpdateStatus {
    pub num_updates: usize,
    pub latest_revision: String,
    pub channels: Vec<String>,
}

impl DocUpdateStatus {
    pub fn new(latest_revision: impl Into<String>, channels: Vec<String>) -> Self {
        Self {
            num_updates: 0,
            latest_revision: latest_revision.into(),
            channels,
        }
    }
}

/// Up to `batch_size` document ids that still have updates left.
///
/// Order follows map iteration and is not stable between runs.
pub fn select_ready(
    ledger: &HashMap<String, DocUpdateStatus>,
    max_updates: usize,
    batch_size: usize,
) -> Vec<String> {
    ledger
        .iter()
        .filter(|(_, status)| status.num_updates < max_updates)
        .take(batch_size)
        .map(|(id, _)| id.clone())
        .collect()
}

/// Ledger of documents announced to an updater
#[derive(Debug, Clone)]
pub struct UpdateTracker {
    max_updates: usize,
    ledger: HashMap<String, DocUpdateStatus>,
}

impl UpdateTracker {
    pub fn new(max_updates: usize) -> Self {
        Self {
            max_updates,
            ledger: HashMap::new(),
        }
    }

    /// Start tracking an inserted document. Returns false if it was already known.
    pub fn track(&mut self, pair: &DocumentRevisionPair, channels: Vec<String>) -> bool {
        if self.ledger.contains_key(&pair.id) {
            return false;
        }
        self.ledger
            .insert(pair.id.clone(), DocUpdateStatus::new(pair.rev.clone(), channels));
        true
    }

    pub fn select_ready(&self, batch_size: usize) -> Vec<String> {
        select_ready(&self.ledger, self.max_updates, batch_size)
    }

    pub fn status(&self, id: &str) -> Option<&DocUpdateStatus> {
        self.ledger.get(id)
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Every tracked document has used its full update budget
    pub fn is_complete(&self) -> bool {
        self.ledger
            .values()
            .all(|status| status.num_updates >= self.max_updates)
    }

    /// Build the document pushing `num_revs` new revisions on top of the
    /// latest known one
    pub fn prepare_update(&self, id: &str, num_revs: usize) -> Result<Document, AgentErrorKind> {
        let status = self
            .ledger
            .get(id)
            .ok_or_else(|| AgentErrorKind::UnknownDocument(id.to_string()))?;

        let (generation, mut ids) = match parse_revision(&status.latest_revision) {
            Some((generation, digest)) => (generation, vec![digest.to_string()]),
            None => (0, Vec::new()),
        };
        let mut history: Vec<String> = (0..num_revs).map(|_| revision_digest()).collect();
        history.append(&mut ids);

        let start = generation + num_revs as u64;
        let mut doc = Document::new();
        doc.set_id(id);
        doc.set_revision(format!("{}-{}", start, history[0]));
        doc.set_revision_history(start, history);
        doc.set_channels(status.channels.as_slice());
        Ok(doc)
    }

    /// Count one applied update, failing if the document had none left
    pub fn record_update(&mut self, id: &str, revision: impl Into<String>) -> Result<usize, AgentErrorKind> {
        let status = self
            .ledger
            .get_mut(id)
            .ok_or_else(|| AgentErrorKind::UnknownDocument(id.to_string()))?;

        if status.num_updates >= self.max_updates {
            return Err(AgentErrorKind::LedgerOverflow {
                doc_id: id.to_string(),
                updates: status.num_updates,
                max: self.max_updates,
            });
        }

        status.num_updates += 1;
        status.latest_revision = revision.into();
        Ok(status.num_updates)
    }
}

fn revision_digest() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}
