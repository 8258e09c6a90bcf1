use std::time::Duration;

use super::cluster::ClusterNode;
use super::sqlite::SqliteDatabase;
use crate::config::AppConfig;
use crate::error::StoreError;

/// Database handle of a cluster member.
///
/// Writes go through the local SQLite core; shipping them to the other
/// replicas is the deployment's job. This type owns the node identity so
/// that shutdown can pass leadership on before the handle goes away.
pub struct ReplicatedDatabase {
    pub(crate) db: SqliteDatabase,
    pub(crate) node: ClusterNode,
}

impl ReplicatedDatabase {
    pub async fn open(config: &AppConfig) -> Result<Self, StoreError> {
        let node = ClusterNode::bootstrap(
            &config.node_address,
            &config.cluster_peers,
            Duration::from_secs(config.handover_timeout_secs),
        )?;
        let db = SqliteDatabase::open(config).await?;
        Ok(Self { db, node })
    }

    /// Hand leadership over, then release the local handle.
    ///
    /// The pool is closed even when the handover fails; the failure is
    /// still reported.
    pub async fn close(&self) -> Result<(), StoreError> {
        tracing::info!(address = %self.node.address(), "Attempting graceful shutdown and handover");

        let handover = self.node.handover().await;
        match &handover {
            Ok(Some(peer)) => tracing::info!(to = %peer, "Handover complete"),
            Ok(None) => tracing::debug!("No peer to hand leadership to"),
            Err(e) => tracing::error!(error = %e, "Handover failed"),
        }

        self.db.close().await;
        handover.map(|_| ())
    }
}
