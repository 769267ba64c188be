//! Random node-id allocation over the free ranges of the id column.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use treeline_domain::{NodeId, NodePayload};

use crate::infrastructure::ports::{IdGap, PathTxn, RandomPort, StoreError};

use super::BatchError;

/// Draws node ids uniformly over the current gaps and inserts the node,
/// drawing again when a concurrent writer took the id first.
pub struct IdAllocator {
    random: Arc<dyn RandomPort>,
    max_retries: u32,
    gap_scan_limit: u32,
}

impl IdAllocator {
    pub fn new(random: Arc<dyn RandomPort>, max_retries: u32, gap_scan_limit: u32) -> Self {
        Self {
            random,
            max_retries: max_retries.max(1),
            gap_scan_limit,
        }
    }

    /// Pick an unused-looking id. Only an insert proves it is free.
    pub async fn next_node_id(&self, txn: &mut dyn PathTxn) -> Result<Option<NodeId>, BatchError> {
        let gaps = txn.node_id_gaps(self.gap_scan_limit).await?;
        Ok(self.draw(&gaps))
    }

    /// Insert a node under a freshly drawn id.
    pub async fn insert_with_fresh_id(
        &self,
        txn: &mut dyn PathTxn,
        payload: &NodePayload,
        now: DateTime<Utc>,
    ) -> Result<NodeId, BatchError> {
        for attempt in 1..=self.max_retries {
            let Some(id) = self.next_node_id(txn).await? else {
                tracing::error!(attempt, "Node id space has no gaps left");
                return Err(BatchError::IdExhausted { attempts: attempt });
            };
            match txn.insert_node(id, payload, now).await {
                Ok(()) => return Ok(id),
                Err(StoreError::NodeIdTaken(taken)) => {
                    tracing::debug!(id = %taken, attempt, "Node id collision, drawing again");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::error!(attempts = self.max_retries, "Node id allocation exhausted");
        Err(BatchError::IdExhausted {
            attempts: self.max_retries,
        })
    }

    fn draw(&self, gaps: &[IdGap]) -> Option<NodeId> {
        let total: u64 = gaps.iter().map(IdGap::len).sum();
        if total == 0 {
            return None;
        }
        let mut offset = self.random.gen_range(0, total - 1).min(total - 1);
        for gap in gaps.iter().filter(|g| !g.is_empty()) {
            if offset < gap.len() {
                let id = u64::from(gap.start) + offset;
                return u32::try_from(id).ok().map(NodeId::new);
            }
            offset -= gap.len();
        }
        None
    }
}
