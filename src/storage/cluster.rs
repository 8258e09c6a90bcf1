use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverRequest {
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub address: String,
    pub leader: bool,
    pub peers: Vec<String>,
}

/// Membership view of one replica.
///
/// Peers are provisioned externally; this node only tracks whether it holds
/// leadership and passes it on when asked to shut down.
pub struct ClusterNode {
    address: String,
    peers: Vec<String>,
    leader: AtomicBool,
    http: reqwest::Client,
    handover_timeout: Duration,
}

impl ClusterNode {
    /// A node with no peers to join starts as leader of a cluster of one.
    pub fn bootstrap(
        address: &str,
        peers: &[String],
        handover_timeout: Duration,
    ) -> Result<Self, StoreError> {
        if address.trim().is_empty() {
            return Err(StoreError::Bootstrap("node address is empty".into()));
        }

        let peers: Vec<String> = peers
            .iter()
            .filter(|p| p.as_str() != address)
            .cloned()
            .collect();

        let http = reqwest::Client::builder()
            .timeout(handover_timeout)
            .build()
            .map_err(|e| StoreError::Bootstrap(e.to_string()))?;

        let leader = peers.is_empty();
        tracing::info!(
            address = %address,
            peers = peers.len(),
            leader,
            "Cluster node bootstrapped"
        );

        Ok(Self {
            address: address.to_string(),
            peers,
            leader: AtomicBool::new(leader),
            http,
            handover_timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    pub fn accept_leadership(&self, from: &str) {
        self.leader.store(true, Ordering::SeqCst);
        tracing::info!(address = %self.address, from = %from, "Leadership accepted");
    }

    pub fn status(&self) -> ClusterStatus {
        ClusterStatus {
            address: self.address.clone(),
            leader: self.is_leader(),
            peers: self.peers.clone(),
        }
    }

    /// Pass leadership to the first peer that accepts it.
    ///
    /// Returns the new leader's address, or `None` when there was nothing to
    /// hand over. The whole attempt is bounded by the handover timeout.
    pub async fn handover(&self) -> Result<Option<String>, StoreError> {
        if self.peers.is_empty() || !self.is_leader() {
            return Ok(None);
        }

        match tokio::time::timeout(self.handover_timeout, self.offer_leadership()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Handover(format!(
                "no peer accepted leadership within {:?}",
                self.handover_timeout
            ))),
        }
    }

    async fn offer_leadership(&self) -> Result<Option<String>, StoreError> {
        let request = HandoverRequest {
            from: self.address.clone(),
        };
        let mut failures = Vec::new();

        for peer in &self.peers {
            let url = format!("http://{}/cluster/handover", peer);
            match self.http.post(&url).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.leader.store(false, Ordering::SeqCst);
                    tracing::info!(to = %peer, "Leadership handed over");
                    return Ok(Some(peer.clone()));
                }
                Ok(resp) => {
                    tracing::warn!(peer = %peer, status = %resp.status(), "Peer refused leadership");
                    failures.push(format!("{}: {}", peer, resp.status()));
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Peer unreachable");
                    failures.push(format!("{}: {}", peer, e));
                }
            }
        }

        Err(StoreError::Handover(failures.join("; ")))
    }
}
