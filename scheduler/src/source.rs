//! Where candidate operations come from.

use async_trait::async_trait;
use keel_governance::OperationKind;
use keel_types::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::error::SchedulerError;

/// An operation observed by the monitoring loop.
///
/// One JSON object per line on the daemon's stdin, e.g.
/// `{"kind":{"type":"MESH_CLAIM","data":{"mesh_id":"E1N1","auto_swap":0}},"target":"0x…"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: OperationKind,
    pub target: Address,
    #[serde(default)]
    pub description: Option<String>,
    /// Overrides the rule's default priority.
    #[serde(default)]
    pub priority: Option<u8>,
    /// When the source saw it; defaults to the monitoring tick's time.
    #[serde(default)]
    pub observed_at: Option<Timestamp>,
    /// Source-assigned nonce. Re-reporting the same (type, time, nonce)
    /// yields the same queue id and is deduplicated.
    #[serde(default)]
    pub nonce: Option<u64>,
}

impl Candidate {
    pub fn new(kind: OperationKind, target: Address) -> Self {
        Self {
            kind,
            target,
            description: None,
            priority: None,
            observed_at: None,
            nonce: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn observed(mut self, at: Timestamp, nonce: u64) -> Self {
        self.observed_at = Some(at);
        self.nonce = Some(nonce);
        self
    }
}

#[async_trait]
pub trait OperationSource: Send + Sync {
    /// Candidates seen since the last poll.
    async fn poll(&self) -> Result<Vec<Candidate>, SchedulerError>;
}

/// Candidates pushed through an mpsc channel by some producer task.
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<Candidate>>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Candidate>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl OperationSource for ChannelSource {
    async fn poll(&self) -> Result<Vec<Candidate>, SchedulerError> {
        let mut rx = self.rx.lock().await;
        let mut out = Vec::new();
        while let Ok(candidate) = rx.try_recv() {
            out.push(candidate);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_governance::{MeshClaim, OperationType};

    #[tokio::test]
    async fn channel_source_drains_pending_candidates() {
        let (tx, source) = ChannelSource::new(8);
        let kind = OperationKind::MeshClaim(MeshClaim {
            mesh_id: "E1N1".into(),
            auto_swap: 0,
        });
        tx.send(Candidate::new(kind.clone(), Address::repeat(1))).await.unwrap();
        tx.send(Candidate::new(kind, Address::repeat(2))).await.unwrap();

        assert_eq!(source.poll().await.unwrap().len(), 2);
        assert!(source.poll().await.unwrap().is_empty());
    }

    #[test]
    fn candidates_parse_from_json_lines() {
        let line = format!(
            r#"{{"kind":{{"type":"STAKE_WITHDRAW","data":{{"early":true}}}},"target":"{}","priority":9}}"#,
            Address::repeat(0x5e)
        );
        let candidate: Candidate = serde_json::from_str(&line).unwrap();
        assert_eq!(candidate.kind.op_type(), OperationType::StakeWithdraw);
        assert_eq!(candidate.priority, Some(9));
        assert_eq!(candidate.observed_at, None);
    }
}
