use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    /// Poll budget spent without seeing fulfillment
    Abandoned,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// A submitted randomness request, tracked until fulfilled or abandoned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomnessRequest {
    /// Sequence number assigned by the entropy contract
    #[serde(with = "crate::models::as_string")]
    pub request_id: u64,
    #[serde(with = "crate::models::hex32")]
    pub user_commitment: [u8; 32],
    pub submission_block: u64,
    pub status: RequestStatus,
}

impl RandomnessRequest {
    pub fn new(request_id: u64, user_commitment: [u8; 32], submission_block: u64) -> Self {
        Self {
            request_id,
            user_commitment,
            submission_block,
            status: RequestStatus::Pending,
        }
    }

    /// Move out of `Pending`; terminal states never change again.
    /// Returns whether the status changed.
    pub fn transition(&mut self, next: RequestStatus) -> bool {
        if self.status.is_terminal() || next == RequestStatus::Pending {
            return false;
        }
        self.status = next;
        true
    }

    pub fn commitment_hex(&self) -> String {
        format!("0x{}", hex::encode(self.user_commitment))
    }
}

/// Final random value for a fulfilled request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomnessResult {
    #[serde(with = "crate::models::hex32")]
    pub value: [u8; 32],
    #[serde(with = "crate::models::as_string")]
    pub request_id: u64,
}

impl RandomnessResult {
    pub fn value_hex(&self) -> String {
        format!("0x{}", hex::encode(self.value))
    }

    pub fn scaled(&self, max: u64) -> AppResult<u64> {
        scale_to_range(&self.value_hex(), max)
    }
}

/// Fresh 32-byte user commitment
pub fn generate_commitment() -> [u8; 32] {
    rand::random()
}

/// Map a hex-encoded unsigned integer of any width into `1..=max`
/// via `(value mod max) + 1`
pub fn scale_to_range(random_hex: &str, max: u64) -> AppResult<u64> {
    if max == 0 {
        return Err(AppError::Validation("range maximum must be at least 1".to_string()));
    }

    let digits = random_hex.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    let bytes = if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits))
    } else {
        hex::decode(digits)
    }
    .map_err(|e| AppError::Validation(format!("invalid random value {}: {}", random_hex, e)))?;

    // acc < max <= u64::MAX, so acc * 256 + 255 stays well inside u128
    let modulus = u128::from(max);
    let remainder = bytes
        .iter()
        .fold(0u128, |acc, byte| (acc * 256 + u128::from(*byte)) % modulus);

    Ok(remainder as u64 + 1)
}
