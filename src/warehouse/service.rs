//! Validated, budget-gated query execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AdsError;
use crate::upstream::validate_id;
use crate::warehouse::{
    BudgetLedger, BudgetUsage, CostEstimate, QueryIssue, QueryJob, QueryValidation, TableSchema,
    Warehouse, WarehouseConfig, WarehouseRoute, validate,
};

/// Result of a billed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Returned rows, at most `row_limit`
    pub rows: Vec<serde_json::Value>,
    /// Row cap applied to the query
    pub row_limit: u32,
    /// Whether the cap was reached
    pub truncated: bool,
    /// Dry-run estimate checked against the budget
    pub estimate: CostEstimate,
    /// Actual billed cost
    pub actual: CostEstimate,
    /// Expensive-pattern warnings from validation
    pub warnings: Vec<QueryIssue>,
}

/// Runs ad-hoc queries through validation, dry-run costing and the budget.
#[derive(Debug)]
pub struct QueryService<W> {
    warehouse: W,
    config: WarehouseConfig,
    ledger: BudgetLedger,
}

impl<W: Warehouse> QueryService<W> {
    /// Create a service; the ledger starts empty.
    pub fn new(warehouse: W, config: WarehouseConfig) -> Self {
        let ledger = BudgetLedger::new(
            config.budget_window,
            config.default_budget,
            config.budgets.clone(),
        );
        Self {
            warehouse,
            config,
            ledger,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Get a reference to the warehouse client.
    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Static validation only; nothing is sent.
    pub fn validate(&self, query: &str) -> QueryValidation {
        validate(query)
    }

    /// Validate, then dry-run to estimate cost. Nothing is billed or recorded.
    ///
    /// A rejected query never reaches the warehouse.
    pub async fn estimate_cost(&self, account_id: &str, query: &str) -> Result<CostEstimate, AdsError> {
        validate(query).into_result()?;
        let route = self.config.route(account_id)?;
        self.dry_run(route, query).await
    }

    async fn dry_run(&self, route: &WarehouseRoute, query: &str) -> Result<CostEstimate, AdsError> {
        let job = QueryJob {
            query: query.to_string(),
            max_results: 0,
            dry_run: true,
            default_dataset: route.dataset.clone(),
        };
        let result = self.warehouse.execute(route, &job).await?;
        let estimate = CostEstimate::from_dry_run(
            result.total_bytes_processed,
            result.cache_hit,
            self.config.price_per_tib,
        );
        tracing::info!(
            bytes = estimate.bytes_processed,
            cost = %estimate.cost,
            cache_hit = estimate.cache_hit,
            "query cost estimated"
        );
        Ok(estimate)
    }

    /// Validate, estimate, reserve budget, then execute with a capped row count.
    ///
    /// # Errors
    ///
    /// - [`AdsError::Validation`] if the denylist matches; nothing is sent
    /// - [`AdsError::BudgetExceeded`] if the estimate exceeds the remaining
    ///   budget; the billed query is never sent
    /// - upstream errors; the reservation is refunded when the warehouse
    ///   answered with an error, and kept when the job may have run (timeout,
    ///   lost connection)
    pub async fn run(
        &self,
        account_id: &str,
        query: &str,
        row_limit: Option<u32>,
    ) -> Result<QueryOutcome, AdsError> {
        let validation = validate(query).into_result()?;
        let route = self.config.route(account_id)?;
        let estimate = self.dry_run(route, query).await?;

        let reservation = self.ledger.try_reserve(account_id, estimate.cost)?;

        let max_rows = self.config.max_rows.max(1);
        let row_limit = row_limit.unwrap_or(max_rows).clamp(1, max_rows);
        let job = QueryJob {
            query: query.to_string(),
            max_results: row_limit,
            dry_run: false,
            default_dataset: route.dataset.clone(),
        };

        let result = match self.warehouse.execute(route, &job).await {
            Ok(result) => result,
            Err(err) if may_have_executed(&err) => {
                tracing::warn!(
                    cost = %estimate.cost,
                    error = %err,
                    "billed query outcome unknown, keeping reservation"
                );
                return Err(err);
            }
            Err(err) => {
                self.ledger.settle(account_id, reservation, Decimal::ZERO);
                return Err(err);
            }
        };

        let actual = CostEstimate::from_execution(
            result.total_bytes_processed,
            result.total_bytes_billed,
            result.cache_hit,
            self.config.price_per_tib,
        );
        self.ledger.settle(account_id, reservation, actual.cost);

        let mut rows = result.rows;
        let truncated = rows.len() >= row_limit as usize;
        rows.truncate(row_limit as usize);

        tracing::info!(
            rows = rows.len(),
            truncated,
            cost = %actual.cost,
            "query executed"
        );

        Ok(QueryOutcome {
            rows,
            row_limit,
            truncated,
            estimate,
            actual,
            warnings: validation.warnings,
        })
    }

    /// Column name/type/mode triples for a table in the account's dataset.
    pub async fn table_schema(&self, account_id: &str, table: &str) -> Result<TableSchema, AdsError> {
        validate_id("table name", table)?;
        let route = self.config.route(account_id)?;
        self.warehouse.table_schema(route, table).await
    }

    /// Rolling-window budget position of an account.
    pub fn usage(&self, account_id: &str) -> BudgetUsage {
        self.ledger.usage(account_id)
    }

    /// Remaining budget of an account.
    pub fn remaining(&self, account_id: &str) -> Decimal {
        self.ledger.usage(account_id).remaining
    }
}

/// Whether a failed billed job may still have run (and been billed).
///
/// Only an answer from the warehouse, or a rejection before sending, proves
/// it did not.
fn may_have_executed(err: &AdsError) -> bool {
    match err {
        AdsError::FatalUpstream(_)
        | AdsError::RetryableUpstream { .. }
        | AdsError::CircuitOpen { .. }
        | AdsError::Backpressure { .. }
        | AdsError::Config(_)
        | AdsError::MissingCredentials => false,
        AdsError::Http(e) => !e.is_connect(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{BYTES_PER_TIB, QueryResult, SchemaField};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records jobs; dry runs report `scan` bytes.
    struct FakeWarehouse {
        scan: u64,
        rows: usize,
        jobs: Mutex<Vec<QueryJob>>,
    }

    impl FakeWarehouse {
        fn new(scan: u64, rows: usize) -> Self {
            Self {
                scan,
                rows,
                jobs: Mutex::new(Vec::new()),
            }
        }

        fn jobs(&self) -> Vec<QueryJob> {
            self.jobs.lock().unwrap().clone()
        }
    }

    impl Warehouse for FakeWarehouse {
        async fn execute(&self, _: &WarehouseRoute, job: &QueryJob) -> Result<QueryResult, AdsError> {
            self.jobs.lock().unwrap().push(job.clone());
            let rows = if job.dry_run {
                Vec::new()
            } else {
                (0..self.rows).map(|i| serde_json::json!({ "n": i })).collect()
            };
            Ok(QueryResult {
                rows,
                total_bytes_processed: self.scan,
                total_bytes_billed: if job.dry_run { 0 } else { self.scan },
                cache_hit: false,
            })
        }

        async fn table_schema(&self, _: &WarehouseRoute, _: &str) -> Result<TableSchema, AdsError> {
            Ok(TableSchema {
                fields: vec![SchemaField {
                    name: "cost".into(),
                    field_type: "NUMERIC".into(),
                    mode: Some("NULLABLE".into()),
                }],
            })
        }
    }

    fn config(budget: Decimal) -> WarehouseConfig {
        let mut routes = HashMap::new();
        routes.insert(
            "acct".to_string(),
            WarehouseRoute {
                project: "proj".into(),
                dataset: "ds".into(),
            },
        );
        let mut budgets = HashMap::new();
        budgets.insert("acct".to_string(), budget);
        WarehouseConfig {
            routes,
            budgets,
            max_rows: 50,
            ..WarehouseConfig::default()
        }
    }

    #[tokio::test]
    async fn test_over_budget_query_never_executes() {
        let service = QueryService::new(FakeWarehouse::new(2 * BYTES_PER_TIB, 0), config(Decimal::new(5, 0)));

        let err = service.run("acct", "SELECT a FROM t LIMIT 1", None).await.unwrap_err();
        assert!(matches!(err, AdsError::BudgetExceeded { .. }));

        let jobs = service.warehouse().jobs();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].dry_run);
        assert_eq!(service.usage("acct").calls, 0);
    }

    #[tokio::test]
    async fn test_rejected_query_never_reaches_estimator() {
        let service = QueryService::new(FakeWarehouse::new(1, 0), config(Decimal::new(5, 0)));

        let err = service.estimate_cost("acct", "DROP TABLE x").await.unwrap_err();
        assert!(matches!(err, AdsError::Validation { .. }));
        assert!(service.warehouse().jobs().is_empty());
    }

    #[tokio::test]
    async fn test_run_caps_rows_and_charges_actual_cost() {
        let service = QueryService::new(FakeWarehouse::new(BYTES_PER_TIB / 4, 80), config(Decimal::new(5, 0)));

        let outcome = service.run("acct", "SELECT * FROM t", Some(500)).await.unwrap();
        assert_eq!(outcome.row_limit, 50);
        assert_eq!(outcome.rows.len(), 50);
        assert!(outcome.truncated);
        assert_eq!(outcome.actual.cost, Decimal::new(15625, 4));
        let rules: Vec<&str> = outcome.warnings.iter().map(|w| w.rule.as_str()).collect();
        assert_eq!(rules, vec!["WILDCARD_PROJECTION", "MISSING_LIMIT"]);

        let jobs = service.warehouse().jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].max_results, 50);
        assert_eq!(jobs[1].default_dataset, "ds");

        let usage = service.usage("acct");
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.spent, Decimal::new(15625, 4));
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_budget() {
        let service = QueryService::new(FakeWarehouse::new(BYTES_PER_TIB / 2, 1), config(Decimal::new(5, 0)));

        let results = futures_util::future::join_all(
            (0..2).map(|_| service.run("acct", "SELECT a FROM t LIMIT 1", None)),
        )
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AdsError::BudgetExceeded { .. }))));
        assert_eq!(service.usage("acct").spent, Decimal::new(3125, 3));
    }

    #[test]
    fn test_only_warehouse_answers_prove_no_execution() {
        use crate::error::{ApiError, UpstreamCode};

        assert!(may_have_executed(&AdsError::Timeout));
        assert!(may_have_executed(&AdsError::InvalidResponse("truncated".into())));
        assert!(!may_have_executed(
            &ApiError::new(UpstreamCode::Unavailable, "busy").into_error(503, None)
        ));
        assert!(!may_have_executed(&AdsError::CircuitOpen {
            retry_after: std::time::Duration::from_secs(1)
        }));
    }

    #[tokio::test]
    async fn test_unknown_account_is_config_error() {
        let service = QueryService::new(FakeWarehouse::new(1, 0), config(Decimal::ONE));
        let err = service.estimate_cost("nobody", "SELECT 1 LIMIT 1").await.unwrap_err();
        assert!(matches!(err, AdsError::Config(_)));
        assert!(!err.to_string().contains("nobody"));
    }

    #[tokio::test]
    async fn test_table_schema_validates_name() {
        let service = QueryService::new(FakeWarehouse::new(1, 0), config(Decimal::ONE));
        assert!(service.table_schema("acct", "keyword_stats").await.is_ok());
        assert!(matches!(
            service.table_schema("acct", "t; DROP").await,
            Err(AdsError::InvalidRequest(_))
        ));
    }
}
