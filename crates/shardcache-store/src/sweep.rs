//! Removal of records hidden by a shard invalidation.
//!
//! Invalidation only bumps a generation; stale records stay in the backend
//! until swept. Each delete is a compare-and-swap on the version seen during
//! the scan, so a record rewritten since (by a live session, or a guild
//! re-created by another shard) survives the sweep.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::Result;
use crate::key::{Key, Table};
use crate::repo::Repo;

/// What a sweep did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SweepReport {
    pub shard: u32,
    /// Generation records had to be older than to be removed.
    pub generation: u64,
    pub scanned: u64,
    pub removed: u64,
    /// Stale records rewritten between scan and delete.
    pub conflicts: u64,
}

impl Repo {
    /// Delete every record `shard` wrote under a generation older than its
    /// current one.
    pub async fn sweep_shard(&self, shard: u32) -> Result<SweepReport> {
        let ticket = self.tracker().sweep_ticket(shard);
        let generation = self.tracker().generation(shard).await?;
        let mut report = SweepReport {
            shard,
            generation,
            ..SweepReport::default()
        };

        for table in Table::ALL.into_iter().filter(|t| t.is_shard_owned()) {
            let prefix = Key::table(table);
            let mut cursor: Option<Key> = None;
            loop {
                let page = self
                    .backend()
                    .scan_prefix(&prefix, cursor.as_ref(), self.page_size())
                    .await?;
                let exhausted = page.len() < self.page_size();
                cursor = page.last().map(|(k, _)| k.clone());

                for (key, stored) in page {
                    report.scanned += 1;
                    let stamp = match codec::decode_stamp(&stored.value) {
                        Ok(stamp) => stamp,
                        Err(e) => {
                            warn!(key = %key, error = %e, "sweep: undecodable record skipped");
                            continue;
                        }
                    };
                    if stamp.shard != Some(shard) || stamp.generation >= generation {
                        continue;
                    }
                    if self
                        .backend()
                        .compare_and_swap(&key, Some(stored.version), None)
                        .await?
                    {
                        report.removed += 1;
                    } else {
                        debug!(key = %key, "sweep: record changed since scan, kept");
                        report.conflicts += 1;
                    }
                }

                if exhausted || cursor.is_none() {
                    break;
                }
            }
        }

        if let Some(ticket) = ticket {
            self.tracker().finish_sweep(shard, ticket);
        }
        info!(
            shard,
            generation,
            scanned = report.scanned,
            removed = report.removed,
            conflicts = report.conflicts,
            "sweep: shard swept"
        );
        Ok(report)
    }

    /// Sweep every shard with a pending request.
    pub async fn sweep_pending(&self) -> Result<Vec<SweepReport>> {
        let mut reports = Vec::new();
        for shard in self.tracker().pending_sweeps() {
            reports.push(self.sweep_shard(shard).await?);
        }
        Ok(reports)
    }
}
