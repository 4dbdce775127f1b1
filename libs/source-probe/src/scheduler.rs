use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::probe::SourceProbe;
use crate::SourceStats;

/// Identity of one probe target: a provider, an entry within it, and the
/// episode being tested. Two requests with the same identity are the same
/// probe, whatever URL they carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub source: String,
    pub id: String,
    pub episode_index: usize,
}

#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub id: SourceId,
    /// Already-resolved episode URL; `None` settles immediately with the
    /// error shape, there is nothing to fetch.
    pub episode_url: Option<String>,
    /// Key the proxy uses to route this provider, when it has one
    pub source_key: Option<String>,
}

/// Picks the episode at `index` from a raw episode list, ignoring blank
/// entries. An out-of-range index clamps to the last episode rather than
/// failing, so a stale selection still plays something.
pub fn resolve_episode_url(episodes: &[String], index: usize) -> Option<String> {
    let playable: Vec<&str> = episodes
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    if playable.is_empty() {
        return None;
    }
    let clamped = index.min(playable.len() - 1);
    Some(playable[clamped].to_string())
}

/// Runs probes in batches of at most the configured cap and publishes each
/// settled result over a channel.
///
/// A single mutex-guarded set is the only admission point: an identity is
/// skipped while a probe for it is in flight, and re-admitted the moment its
/// result settles. Fresh cache entries are also skipped, the prober would
/// only echo them back.
pub struct ProbeScheduler<P: SourceProbe> {
    prober: Arc<P>,
    max_concurrent: usize,
    testing: Arc<Mutex<HashSet<SourceId>>>,
    result_tx: UnboundedSender<(SourceId, SourceStats)>,
}

impl<P: SourceProbe + 'static> ProbeScheduler<P> {
    pub fn new(
        prober: Arc<P>,
        max_concurrent: usize,
    ) -> (Self, UnboundedReceiver<(SourceId, SourceStats)>) {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        (
            Self {
                prober,
                max_concurrent: max_concurrent.max(1),
                testing: Arc::new(Mutex::new(HashSet::new())),
                result_tx,
            },
            result_rx,
        )
    }

    pub fn is_testing(&self, id: &SourceId) -> bool {
        self.testing.lock().unwrap().contains(id)
    }

    /// Admits the given requests and probes them in bounded batches until
    /// the list is exhausted or the token is cancelled. An in-flight batch
    /// always runs to completion; cancellation stops new batches from
    /// starting and suppresses publication of results that settle late.
    pub async fn schedule(&self, requests: Vec<ProbeRequest>, token: &CancellationToken) {
        let admitted = self.admit(requests);
        if admitted.is_empty() {
            return;
        }
        log::debug!("Scheduling {} source probes", admitted.len());

        let mut next = 0;
        while next < admitted.len() {
            if token.is_cancelled() {
                // these never ran, release their marks
                for request in &admitted[next..] {
                    self.clear_mark(&request.id);
                }
                return;
            }

            let end = (next + self.max_concurrent).min(admitted.len());
            let futures = admitted[next..end]
                .iter()
                .map(|request| self.run_one(request, token));
            join_all(futures).await;
            next = end;
        }
    }

    fn admit(&self, requests: Vec<ProbeRequest>) -> Vec<ProbeRequest> {
        let mut testing = self.testing.lock().unwrap();
        let mut admitted = Vec::new();
        for request in requests {
            if testing.contains(&request.id) {
                continue;
            }
            if let Some(url) = &request.episode_url {
                if self
                    .prober
                    .has_fresh_stats(url, request.source_key.as_deref())
                {
                    continue;
                }
            }
            testing.insert(request.id.clone());
            admitted.push(request);
        }
        admitted
    }

    async fn run_one(&self, request: &ProbeRequest, token: &CancellationToken) {
        let stats = match &request.episode_url {
            Some(url) => {
                self.prober
                    .probe(url, request.source_key.as_deref(), token)
                    .await
            }
            None => SourceStats::unavailable(""),
        };

        self.clear_mark(&request.id);
        if token.is_cancelled() {
            return;
        }
        // the receiver may be gone; a dropped result is fine then
        let _ = self.result_tx.send((request.id.clone(), stats));
    }

    fn clear_mark(&self, id: &SourceId) {
        self.testing.lock().unwrap().remove(id);
    }
}
