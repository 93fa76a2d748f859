//! Budget domain entities and the per-user state snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uniform id access for entities that live in snapshot collections.
///
/// Every entity id is a UUID generated locally at creation time and doubles
/// as the remote primary key, which is what makes remote upserts idempotent.
pub trait EntityId {
    fn entity_id(&self) -> &str;
}

/// How often an income source pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCadence {
    Weekly,
    Biweekly,
    SemiMonthly,
    Monthly,
}

/// A recurring income source (salary, side gig, benefit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSource {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub amount: Decimal,
    pub cadence: IncomeCadence,
}

/// One budgeting period (usually a pay period or a month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCycle {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub expected_income: Decimal,
}

/// A spending category within a cycle.
///
/// `allocated` is recomputed by the allocation heuristics unless
/// `fixed_amount` is set, in which case the manual override sticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub cycle_id: String,
    pub name: String,
    pub weight: Decimal,
    pub allocated: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_amount: Option<Decimal>,
}

/// A single spend or income event recorded against a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub cycle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub description: String,
    pub amount: Decimal,
    pub occurred_on: NaiveDate,
}

impl EntityId for IncomeSource {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl EntityId for BudgetCycle {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl EntityId for Category {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl EntityId for Transaction {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// The full local view of one user's budget.
///
/// The in-memory copy held by callers is a cache: every change must be
/// written back through the state store's `save`, never mutated in place and
/// left unpersisted. `updated_at` is stamped by the store on persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub user_id: String,
    pub income_sources: Vec<IncomeSource>,
    pub cycles: Vec<BudgetCycle>,
    pub categories: Vec<Category>,
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub preferences: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Fresh empty snapshot, the default for a user with no persisted state.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            income_sources: Vec::new(),
            cycles: Vec::new(),
            categories: Vec::new(),
            transactions: Vec::new(),
            preferences: Map::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.income_sources.is_empty()
            && self.cycles.is_empty()
            && self.categories.is_empty()
            && self.transactions.is_empty()
            && self.preferences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_entities() {
        let snapshot = Snapshot::empty("user-1");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.user_id, "user-1");
    }

    #[test]
    fn snapshot_serialization_uses_camel_case() {
        let snapshot = Snapshot::empty("user-1");
        let value = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert!(value.get("userId").is_some());
        assert!(value.get("incomeSources").is_some());
        assert!(value.get("updatedAt").is_some());
    }

    #[test]
    fn cadence_serialization_matches_backend_contract() {
        assert_eq!(
            serde_json::to_string(&IncomeCadence::SemiMonthly).expect("serialize cadence"),
            "\"semi_monthly\""
        );
    }
}
