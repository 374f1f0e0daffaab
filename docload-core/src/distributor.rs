//! Document and channel assignment
//!
//! Documents are generated up front and dealt out in one index space: document
//! `i` goes to channel `i mod channels` and writer `i mod writers`. Every
//! channel is used, writer load differs by at most one document, and each
//! writer's documents are spread over many channels.
//!
//! Ids are fixed up front as `{session}-{docNum}` so a batch re-sent after a
//! lost response cannot create a second copy of a document.

use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use docload_interfaces::Document;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

/// Documents assigned to each writer, indexed by writer id
pub type Assignment = Vec<Vec<Document>>;

/// Channel names for a session: `{index}-{session}`
pub fn channel_names(num_channels: usize, session_id: &str) -> Vec<String> {
    (0..num_channels)
        .map(|i| format!("{}-{}", i, session_id))
        .collect()
}

/// Generate `num_docs` documents and deal them out to `num_writers` writers.
pub fn distribute(
    num_writers: usize,
    channel_names: &[String],
    num_docs: usize,
    doc_size_bytes: usize,
    session_id: &str,
) -> EngineResult<Assignment> {
    if num_writers == 0 {
        return Err(EngineError::Distribution(
            "at least one writer is required".to_string(),
        ));
    }
    if channel_names.is_empty() {
        return Err(EngineError::Distribution(
            "at least one channel is required".to_string(),
        ));
    }
    if channel_names.len() > num_docs {
        return Err(EngineError::Distribution(format!(
            "{} channels cannot be covered by {} documents",
            channel_names.len(),
            num_docs
        )));
    }

    let mut assignment: Assignment = (0..num_writers)
        .map(|writer| Vec::with_capacity(share(num_docs, num_writers, writer)))
        .collect();

    let mut rng = rand::thread_rng();
    let created_at = Utc::now();
    for doc_index in 0..num_docs {
        let channel = &channel_names[doc_index % channel_names.len()];

        let mut doc = Document::new();
        doc.set_id(document_id(session_id, doc_index as u64));
        doc.set_channels(std::slice::from_ref(channel));
        doc.set_doc_num(doc_index as u64);
        doc.set_created_at(created_at);
        doc.set_body(padding(&mut rng, doc_size_bytes));

        assignment[doc_index % num_writers].push(doc);
    }

    Ok(assignment)
}

/// Id of document `doc_num` in a session
pub fn document_id(session_id: &str, doc_num: u64) -> String {
    format!("{}-{}", session_id, doc_num)
}

/// Number of indices `i < total` with `i mod parts == index`.
///
/// This is how many documents land on a given channel, writer or updater.
pub fn share(total: usize, parts: usize, index: usize) -> usize {
    if parts == 0 || index >= parts {
        return 0;
    }
    total / parts + usize::from(index < total % parts)
}

/// Pick `k` distinct channels for a reader. `k == 0` selects every channel.
pub fn assign_channels_to_reader(k: usize, channels: &[String]) -> Vec<String> {
    if k == 0 || k >= channels.len() {
        return channels.to_vec();
    }
    channels
        .choose_multiple(&mut rand::thread_rng(), k)
        .cloned()
        .collect()
}

/// Documents a reader should see given the channels it follows
pub fn expected_for_channels(
    num_docs: usize,
    all_channels: &[String],
    reader_channels: &[String],
) -> usize {
    all_channels
        .iter()
        .enumerate()
        .filter(|(_, name)| reader_channels.contains(name))
        .map(|(index, _)| share(num_docs, all_channels.len(), index))
        .sum()
}

fn padding<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
