//! Metered analytical warehouse: query validation, cost estimation,
//! budget enforcement and execution.
//!
//! Every ad-hoc query passes the same gates, in order:
//!
//! 1. [`validate`]: denylist on normalized text; rejected queries never leave the process
//! 2. dry run: the engine reports bytes it would scan, converted to money by [`CostEstimate`]
//! 3. [`BudgetLedger`]: the estimate must fit the account's rolling-window remainder
//! 4. execution with a capped row count; the actual billed cost replaces the estimate
//!
//! [`QueryService`] wires these together over any [`Warehouse`].

mod budget;
mod client;
mod cost;
mod service;
mod validator;

pub use budget::{BudgetLedger, BudgetUsage, Reservation};
pub use client::{
    QueryJob, QueryResult, SchemaField, TableSchema, Warehouse, WarehouseRestClient,
    WarehouseRestClientBuilder,
};
pub use cost::{BYTES_PER_TIB, CostEstimate};
pub use service::{QueryOutcome, QueryService};
pub use validator::{QueryIssue, QueryValidation, normalize, validate};

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::error::AdsError;

/// Base URL for the warehouse API.
pub const WAREHOUSE_BASE_URL: &str = "https://warehouse.example.com";

/// Where an account's exported data lives in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarehouseRoute {
    /// Billing project
    pub project: String,
    /// Default dataset for unqualified table names
    pub dataset: String,
}

/// Warehouse configuration.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Warehouse API base URL.
    pub base_url: String,
    /// Approximate on-demand price per TiB scanned. Provider pricing drifts;
    /// keep this current.
    pub price_per_tib: Decimal,
    /// Rolling budget window.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "budget_window_secs")]
    pub budget_window: Duration,
    /// Ceiling for accounts without an explicit entry in `budgets`.
    pub default_budget: Decimal,
    /// Per-account ceilings.
    pub budgets: HashMap<String, Decimal>,
    /// Account to warehouse route lookup.
    pub routes: HashMap<String, WarehouseRoute>,
    /// Upper bound on rows returned by one query.
    pub max_rows: u32,
}

impl WarehouseConfig {
    /// Route for an account.
    ///
    /// The returned error carries no account id.
    pub fn route(&self, account_id: &str) -> Result<&WarehouseRoute, AdsError> {
        self.routes.get(account_id).ok_or_else(|| {
            tracing::warn!(account_id, "no warehouse route configured");
            AdsError::Config("no warehouse route for account".to_string())
        })
    }

    /// Budget ceiling for an account.
    pub fn budget_for(&self, account_id: &str) -> Decimal {
        self.budgets
            .get(account_id)
            .copied()
            .unwrap_or(self.default_budget)
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            base_url: WAREHOUSE_BASE_URL.to_string(),
            price_per_tib: Decimal::new(625, 2),
            budget_window: Duration::from_secs(86_400),
            default_budget: Decimal::new(10, 0),
            budgets: HashMap::new(),
            routes: HashMap::new(),
            max_rows: 1_000,
        }
    }
}
