//! Mileage ledger: append-only record of balance changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::EntityId;

/// One immutable balance change. Never mutated client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MileageLedgerEntry {
    pub id: EntityId,
    pub customer_id: EntityId,
    pub qualifying_miles_delta: i64,
    pub bonus_miles_delta: i64,
    /// Originating request; absent for expiry and manual adjustments.
    #[serde(default)]
    pub accrual_request_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MileageLedgerEntry {
    pub const fn is_adjustment(&self) -> bool {
        self.accrual_request_id.is_none()
    }

    pub const fn total_delta(&self) -> i64 {
        self.qualifying_miles_delta + self.bonus_miles_delta
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entry_without_request_is_adjustment() {
        let json = r#"{
            "id": "9",
            "customer_id": 17,
            "qualifying_miles_delta": -500,
            "bonus_miles_delta": 0,
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let entry: MileageLedgerEntry = serde_json::from_str(json).unwrap();
        assert!(entry.is_adjustment());
        assert_eq!(entry.total_delta(), -500);
    }

    #[test]
    fn entry_with_request_is_accrual() {
        let json = r#"{
            "id": "10",
            "customer_id": "17",
            "qualifying_miles_delta": 1200,
            "bonus_miles_delta": 300,
            "accrual_request_id": "245241133272138248",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let entry: MileageLedgerEntry = serde_json::from_str(json).unwrap();
        assert!(!entry.is_adjustment());
        assert_eq!(entry.total_delta(), 1500);
    }
}
