//! Operations and their typed payloads.

use std::fmt;
use std::str::FromStr;

use keel_types::{Address, Amount, OperationId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// The closed set of operation types the registry understands.
///
/// Discriminants match the on-chain enum ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    MeshClaim = 0,
    MeshWithdraw = 1,
    RewardSet = 2,
    RewardWithdraw = 3,
    Stake = 4,
    StakeWithdraw = 5,
    EmergencyPause = 6,
    EmergencyResume = 7,
}

impl OperationType {
    pub const ALL: [OperationType; 8] = [
        Self::MeshClaim,
        Self::MeshWithdraw,
        Self::RewardSet,
        Self::RewardWithdraw,
        Self::Stake,
        Self::StakeWithdraw,
        Self::EmergencyPause,
        Self::EmergencyResume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeshClaim => "MESH_CLAIM",
            Self::MeshWithdraw => "MESH_WITHDRAW",
            Self::RewardSet => "REWARD_SET",
            Self::RewardWithdraw => "REWARD_WITHDRAW",
            Self::Stake => "STAKE",
            Self::StakeWithdraw => "STAKE_WITHDRAW",
            Self::EmergencyPause => "EMERGENCY_PAUSE",
            Self::EmergencyResume => "EMERGENCY_RESUME",
        }
    }

    /// Whether this operation toggles the registry's own pause flag rather
    /// than calling out to a target.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::EmergencyPause | Self::EmergencyResume)
    }

    /// Gas a typical execution of this type consumes on the substrate.
    pub fn gas_estimate(&self) -> u64 {
        match self {
            Self::MeshClaim => 180_000,
            Self::MeshWithdraw => 120_000,
            Self::RewardSet => 250_000,
            Self::RewardWithdraw => 90_000,
            Self::Stake => 150_000,
            Self::StakeWithdraw => 110_000,
            Self::EmergencyPause | Self::EmergencyResume => 45_000,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operation type {s:?}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshClaim {
    pub mesh_id: String,
    pub auto_swap: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshWithdraw {
    pub mesh_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSet {
    pub users: Vec<Address>,
    pub amounts: Vec<Amount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardWithdraw {
    pub recipient: Address,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeDeposit {
    pub amount: Amount,
    pub term_days: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeWithdraw {
    /// Exit before maturity, paying the early-withdraw penalty.
    pub early: bool,
}

/// An operation's type together with its strongly-typed payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    MeshClaim(MeshClaim),
    MeshWithdraw(MeshWithdraw),
    RewardSet(RewardSet),
    RewardWithdraw(RewardWithdraw),
    Stake(StakeDeposit),
    StakeWithdraw(StakeWithdraw),
    EmergencyPause,
    EmergencyResume,
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    // Serializing these plain structs into a Vec cannot fail.
    bincode::serialize(value).unwrap_or_default()
}

impl OperationKind {
    pub fn op_type(&self) -> OperationType {
        match self {
            Self::MeshClaim(_) => OperationType::MeshClaim,
            Self::MeshWithdraw(_) => OperationType::MeshWithdraw,
            Self::RewardSet(_) => OperationType::RewardSet,
            Self::RewardWithdraw(_) => OperationType::RewardWithdraw,
            Self::Stake(_) => OperationType::Stake,
            Self::StakeWithdraw(_) => OperationType::StakeWithdraw,
            Self::EmergencyPause => OperationType::EmergencyPause,
            Self::EmergencyResume => OperationType::EmergencyResume,
        }
    }

    /// The opaque payload bytes stored alongside the operation.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::MeshClaim(p) => encode(p),
            Self::MeshWithdraw(p) => encode(p),
            Self::RewardSet(p) => encode(p),
            Self::RewardWithdraw(p) => encode(p),
            Self::Stake(p) => encode(p),
            Self::StakeWithdraw(p) => encode(p),
            Self::EmergencyPause | Self::EmergencyResume => Vec::new(),
        }
    }

    /// Default human-readable description for a proposal of this kind.
    pub fn describe(&self) -> String {
        match self {
            Self::MeshClaim(p) => format!("Claim mesh: {}", p.mesh_id),
            Self::MeshWithdraw(p) => format!("Withdraw mesh: {}", p.mesh_id),
            Self::RewardSet(p) => format!("Set user rewards for {} users", p.users.len()),
            Self::RewardWithdraw(p) => format!("Withdraw {} reward to {}", p.amount, p.recipient),
            Self::Stake(p) => format!("Stake {} tokens for {} days", p.amount, p.term_days),
            Self::StakeWithdraw(p) if p.early => "Withdraw stake early".to_string(),
            Self::StakeWithdraw(_) => "Withdraw matured stake".to_string(),
            Self::EmergencyPause => "Emergency pause".to_string(),
            Self::EmergencyResume => "Emergency resume".to_string(),
        }
    }

    /// Decode `payload` as the payload of `op_type`, then check its shape.
    pub fn decode(op_type: OperationType, payload: &[u8]) -> Result<Self, RegistryError> {
        let malformed = |reason: String| RegistryError::MalformedPayload { op_type, reason };
        let kind = match op_type {
            OperationType::MeshClaim => Self::MeshClaim(decode_as(payload).map_err(malformed)?),
            OperationType::MeshWithdraw => {
                Self::MeshWithdraw(decode_as(payload).map_err(malformed)?)
            }
            OperationType::RewardSet => Self::RewardSet(decode_as(payload).map_err(malformed)?),
            OperationType::RewardWithdraw => {
                Self::RewardWithdraw(decode_as(payload).map_err(malformed)?)
            }
            OperationType::Stake => Self::Stake(decode_as(payload).map_err(malformed)?),
            OperationType::StakeWithdraw => {
                Self::StakeWithdraw(decode_as(payload).map_err(malformed)?)
            }
            OperationType::EmergencyPause | OperationType::EmergencyResume => {
                if !payload.is_empty() {
                    return Err(malformed(format!(
                        "expected empty payload, got {} bytes",
                        payload.len()
                    )));
                }
                if op_type == OperationType::EmergencyPause {
                    Self::EmergencyPause
                } else {
                    Self::EmergencyResume
                }
            }
        };
        kind.validate()?;
        Ok(kind)
    }

    /// Shape checks a well-typed payload must still pass.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let op_type = self.op_type();
        let malformed = |reason: &str| {
            Err(RegistryError::MalformedPayload {
                op_type,
                reason: reason.to_string(),
            })
        };
        match self {
            Self::MeshClaim(MeshClaim { mesh_id, .. })
            | Self::MeshWithdraw(MeshWithdraw { mesh_id }) => {
                if mesh_id.trim().is_empty() {
                    return malformed("mesh id is empty");
                }
            }
            Self::RewardSet(RewardSet { users, amounts }) => {
                if users.is_empty() {
                    return malformed("no users");
                }
                if users.len() != amounts.len() {
                    return malformed("users and amounts differ in length");
                }
            }
            Self::RewardWithdraw(RewardWithdraw { recipient, .. }) => {
                if recipient.is_zero() {
                    return malformed("recipient is the zero address");
                }
            }
            Self::Stake(StakeDeposit { amount, .. }) => {
                if amount.is_zero() {
                    return malformed("stake amount is zero");
                }
            }
            Self::StakeWithdraw(_) | Self::EmergencyPause | Self::EmergencyResume => {}
        }
        Ok(())
    }
}

fn decode_as<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, String> {
    bincode::deserialize(payload).map_err(|e| e.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Proposed,
    /// Terminal.
    Executed,
}

/// A proposed operation. Permanent audit record; never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: Address,
    pub description: String,
    pub proposer: Address,
    pub proposed_at: Timestamp,
    /// Monotonic: once true, never reset.
    pub executed: bool,
    pub executed_at: Option<Timestamp>,
}

impl Operation {
    pub fn op_type(&self) -> OperationType {
        self.kind.op_type()
    }

    pub fn payload(&self) -> Vec<u8> {
        self.kind.payload()
    }

    pub fn status(&self) -> OperationStatus {
        if self.executed {
            OperationStatus::Executed
        } else {
            OperationStatus::Proposed
        }
    }
}

/// What a successful execution returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutput {
    /// Control operations and calls with no return value.
    Unit,
    Staked {
        maturity: Timestamp,
    },
    Settled {
        paid: Amount,
        interest: Amount,
        penalty: Amount,
    },
    /// Raw return data from an external collaborator.
    External(Vec<u8>),
}
