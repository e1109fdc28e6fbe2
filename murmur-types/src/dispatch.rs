//! Background-job hand-off contract.
//!
//! Once poll results are decoded and deduplicated, durable follow-up work is
//! described as a [`SyncJob`] and handed to the application's job system via
//! [`JobDispatcher`]. The sync core never blocks on job execution; failures
//! inside the job system are the dispatcher's problem.

use crate::ids::AccountId;
use crate::swarm::{ConfigDumpRecord, DecodedEnvelope};

/// A typed description of background work produced by the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncJob {
    /// Push an account's pending config changes to the swarm.
    PushConfig {
        /// The account whose configs need pushing.
        account: AccountId,
    },
    /// Replicate freshly created config dumps to paired devices / backup.
    ReplicateDumps {
        /// The account the dumps belong to.
        account: AccountId,
        /// The dumps created by the committing operation.
        dumps: Vec<ConfigDumpRecord>,
    },
    /// Apply a batch of decoded messages for one conversation to durable
    /// storage.
    ProcessMessages {
        /// The logical conversation all envelopes belong to.
        conversation: String,
        /// The decoded messages, in arrival order.
        envelopes: Vec<DecodedEnvelope>,
    },
}

/// Accepts job descriptions from the sync core.
///
/// `durable` indicates whether the job must be persisted and survive a
/// restart (config pushes) or may run immediately and be lost on crash
/// (best-effort replication).
pub trait JobDispatcher: Send + Sync {
    /// Enqueue one job. Must not block.
    fn dispatch(&self, job: SyncJob, durable: bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        jobs: Mutex<Vec<(SyncJob, bool)>>,
    }

    impl JobDispatcher for Recorder {
        fn dispatch(&self, job: SyncJob, durable: bool) {
            self.jobs.lock().unwrap().push((job, durable));
        }
    }

    #[test]
    fn dispatcher_is_object_safe() {
        let recorder = Recorder {
            jobs: Mutex::new(Vec::new()),
        };
        let dispatcher: &dyn JobDispatcher = &recorder;
        let account = AccountId::new(&format!("05{}", "ab".repeat(32))).unwrap();
        dispatcher.dispatch(SyncJob::PushConfig { account }, true);
        assert_eq!(recorder.jobs.lock().unwrap().len(), 1);
    }
}
