use super::{Agent, AgentIdentity, AgentRole};
use crate::error::{AgentError, AgentErrorKind};
use crate::metrics::ops;
use crate::rate::RateScheduler;
use async_trait::async_trait;
use docload_config::FeedType;
use docload_interfaces::{ChangeCursor, ChangeSet, ChangesFeed, DataStore, DocumentRevisionPair};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Pause after a normal-feed poll that returned nothing new, or after any
/// skipped poll
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Follows the changes feed until it has seen every document expected on its
/// channels.
///
/// Documents are counted once by id; later changes for the same id are
/// updates and do not count again. Internal user records are ignored.
pub struct Reader<S> {
    identity: AgentIdentity<S>,
    channels: Vec<String>,
    grants: Vec<String>,
    feed_type: FeedType,
    limit: usize,
    fetch_docs: bool,
    expected: usize,
    seen: HashSet<String>,
    cursor: ChangeCursor,
    scheduler: RateScheduler,
    polls: usize,
}

impl<S: DataStore + 'static> Reader<S> {
    /// An empty `channels` list follows the whole, unfiltered feed. The
    /// reader's user is granted `channels` unless [`Reader::with_grants`] says
    /// otherwise.
    pub fn new(
        identity: AgentIdentity<S>,
        channels: Vec<String>,
        feed_type: FeedType,
        expected: usize,
    ) -> Self {
        let scheduler = identity.scheduler();
        Self {
            identity,
            grants: channels.clone(),
            channels,
            feed_type,
            limit: 100,
            fetch_docs: false,
            expected,
            seen: HashSet::new(),
            cursor: ChangeCursor::empty(),
            scheduler,
            polls: 0,
        }
    }

    /// Channels granted to the reader's user, independent of the feed filter
    pub fn with_grants(mut self, grants: Vec<String>) -> Self {
        self.grants = grants;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_fetch_docs(mut self, fetch_docs: bool) -> Self {
        self.fetch_docs = fetch_docs;
        self
    }

    pub fn observed(&self) -> usize {
        self.seen.len()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn cursor(&self) -> &ChangeCursor {
        &self.cursor
    }

    /// Count a page of changes.
    ///
    /// Returns the revisions to fetch and the number of newly seen documents.
    /// Seeing more distinct documents than expected is a fatal error.
    pub fn observe(
        &mut self,
        changes: &ChangeSet,
    ) -> Result<(Vec<DocumentRevisionPair>, usize), AgentErrorKind> {
        let mut refs = Vec::new();
        let mut fresh = 0;

        for change in changes.iter().filter(|c| !c.is_user_doc()) {
            if self.seen.insert(change.id.clone()) {
                fresh += 1;
                if self.seen.len() > self.expected {
                    return Err(AgentErrorKind::OverCount {
                        observed: self.seen.len(),
                        expected: self.expected,
                    });
                }
            }
            if let Some(rev) = change.latest_rev() {
                refs.push(DocumentRevisionPair::new(change.id.clone(), rev));
            }
        }

        Ok((refs, fresh))
    }

    /// One feed request. `None` means the call failed and was skipped.
    async fn poll(&mut self) -> Result<Option<usize>, AgentError> {
        self.scheduler.pace().await;
        self.polls += 1;

        let start = Instant::now();
        let store = self.identity.store();
        let cursor = &self.cursor;
        let limit = self.limit;
        let page = self
            .identity
            .policy()
            .run("changes", move |_| store.changes(cursor, limit))
            .await
            .map_err(|kind| self.identity.error("changes", kind))?;

        let Some((changes, next)) = page else {
            return Ok(None);
        };
        self.identity.record_timing(ops::BATCH_READ, start.elapsed());

        let (refs, fresh) = self
            .observe(&changes)
            .map_err(|kind| self.identity.error("changes", kind))?;
        self.cursor = next;

        if fresh > 0 {
            self.identity.increment(ops::DOCS_READ, fresh);
            self.identity.advance(fresh);
            debug!(
                agent_id = self.identity.id(),
                fresh,
                observed = self.seen.len(),
                expected = self.expected,
                cursor = %self.cursor,
                "changes received"
            );
        }

        if self.fetch_docs && !refs.is_empty() {
            self.fetch(&refs).await?;
        }

        Ok(Some(fresh))
    }

    async fn fetch(&self, refs: &[DocumentRevisionPair]) -> Result<(), AgentError> {
        let start = Instant::now();
        let store = self.identity.store();
        let fetched = self
            .identity
            .policy()
            .run("bulk_get", move |_| store.bulk_get_documents(refs))
            .await
            .map_err(|kind| self.identity.error("bulk_get", kind))?;
        if fetched.is_some() {
            self.identity.record_timing(ops::BULK_GET, start.elapsed());
        }
        Ok(())
    }
}

#[async_trait]
impl<S: DataStore + 'static> Agent for Reader<S> {
    fn role(&self) -> AgentRole {
        AgentRole::Reader
    }

    fn id(&self) -> usize {
        self.identity.id()
    }

    async fn run(&mut self) -> Result<(), AgentError> {
        self.identity.provision(&self.grants).await?;
        self.identity.store_mut().set_changes_feed(ChangesFeed {
            feed: self.feed_type,
            channels: self.channels.clone(),
        });

        while self.seen.len() < self.expected {
            let idle = match self.poll().await? {
                Some(fresh) => fresh == 0 && self.feed_type == FeedType::Normal,
                None => true,
            };
            if idle {
                tokio::time::sleep(IDLE_POLL_INTERVAL.max(self.scheduler.delay())).await;
            }
        }

        info!(
            agent_id = self.identity.id(),
            observed = self.seen.len(),
            polls = self.polls,
            "reader finished"
        );
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.seen.len() == self.expected
    }
}
