//! Scan-cost estimation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bytes in one tebibyte, the unit on-demand pricing is quoted in.
pub const BYTES_PER_TIB: u64 = 1 << 40;

/// Monetary estimate for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Bytes the engine reports it will scan (or scanned)
    pub bytes_processed: u64,
    /// Bytes billed; zero for dry runs
    pub bytes_billed: u64,
    /// Estimated cost in account currency
    pub cost: Decimal,
    /// Answered from the engine's result cache: nothing is billed
    pub cache_hit: bool,
}

impl CostEstimate {
    /// Convert a byte count to money at `price_per_tib`.
    ///
    /// ```rust
    /// use ads_insight_client::warehouse::{BYTES_PER_TIB, CostEstimate};
    /// use rust_decimal::Decimal;
    ///
    /// let cost = CostEstimate::bytes_to_cost(2 * BYTES_PER_TIB, Decimal::new(625, 2));
    /// assert_eq!(cost, Decimal::new(1250, 2));
    /// ```
    pub fn bytes_to_cost(bytes: u64, price_per_tib: Decimal) -> Decimal {
        let tib = Decimal::from(bytes) / Decimal::from(BYTES_PER_TIB);
        (tib * price_per_tib).round_dp(6).normalize()
    }

    /// Estimate from a dry run: priced on bytes processed.
    pub fn from_dry_run(bytes_processed: u64, cache_hit: bool, price_per_tib: Decimal) -> Self {
        let cost = if cache_hit {
            Decimal::ZERO
        } else {
            Self::bytes_to_cost(bytes_processed, price_per_tib)
        };
        Self {
            bytes_processed,
            bytes_billed: 0,
            cost,
            cache_hit,
        }
    }

    /// Actual cost of an executed query: priced on bytes billed.
    pub fn from_execution(
        bytes_processed: u64,
        bytes_billed: u64,
        cache_hit: bool,
        price_per_tib: Decimal,
    ) -> Self {
        let cost = if cache_hit {
            Decimal::ZERO
        } else {
            Self::bytes_to_cost(bytes_billed, price_per_tib)
        };
        Self {
            bytes_processed,
            bytes_billed,
            cost,
            cache_hit,
        }
    }

    /// Whether running the query costs nothing.
    pub fn is_free(&self) -> bool {
        self.cost.is_zero()
    }
}
