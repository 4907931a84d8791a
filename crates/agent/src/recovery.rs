//! Startup recovery sweep over the consumer group's pending set.
//!
//! Entries delivered to a previous (possibly crashed) instance but never
//! acknowledged are reclaimed and replayed through the same pipeline entry
//! point, then acknowledged. Recovery is best-effort, not a startup
//! precondition: any genuine transport failure abandons the sweep and
//! steady-state consumption proceeds.

use std::sync::Arc;

use drafthorse_core::mailbox::Mailbox;
use tracing::{debug, info, warn};

use crate::handler::PromptHandler;

/// Entries claimed per XAUTOCLAIM call.
const RECOVERY_BATCH_SIZE: usize = 50;

/// Cursor marking the start of the pending set.
const SWEEP_START: &str = "0-0";

/// Claim and replay pending entries left behind by a dead consumer.
///
/// The sweep is complete when a claim returns zero entries or the cursor
/// wraps back to the start.
pub async fn recover_pending(
    mailbox: Arc<dyn Mailbox>,
    handler: Arc<PromptHandler>,
    agent_id: String,
) {
    info!(agent_id = %agent_id, "Starting pending recovery sweep");

    let mut cursor = SWEEP_START.to_string();
    let mut recovered: usize = 0;

    loop {
        let batch = match mailbox.claim_pending(&cursor, RECOVERY_BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(e) if e.is_group_missing() => {
                // Fresh deployment: the group has never been created.
                debug!(agent_id = %agent_id, "No pending state to recover");
                return;
            }
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    error = %e,
                    "Pending recovery failed, abandoning sweep"
                );
                return;
            }
        };

        cursor = batch.next_cursor;
        debug!(
            agent_id = %agent_id,
            cursor = %cursor,
            entries = batch.entries.len(),
            "Pending recovery iteration"
        );
        if batch.entries.is_empty() {
            break;
        }

        for delivery in batch.entries {
            info!(
                agent_id = %agent_id,
                entry_id = %delivery.entry_id,
                "Recovering pending entry"
            );
            handler.handle(&delivery.message).await;
            // Acknowledge only after a full processing cycle; a crash before
            // this point leaves the entry pending for the next sweep.
            if let Err(e) = mailbox.ack(&delivery.entry_id).await {
                warn!(
                    agent_id = %agent_id,
                    entry_id = %delivery.entry_id,
                    error = %e,
                    "Failed to acknowledge recovered entry, abandoning sweep"
                );
                return;
            }
            recovered += 1;
        }

        if cursor == SWEEP_START {
            break;
        }
    }

    if recovered > 0 {
        info!(agent_id = %agent_id, recovered, "Recovered pending mailbox entries");
    }
}
