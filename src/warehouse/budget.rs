//! Rolling-window spend ledger per account.
//!
//! Each account keeps a sliding window of charges. A billed query first
//! reserves its estimate ([`BudgetLedger::try_reserve`]), which fails when
//! the estimate exceeds the remaining budget; after execution the
//! reservation is amended in place to the actual cost
//! ([`BudgetLedger::settle`]), so it leaves the window at its original time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::AdsError;

/// Idle accounts are swept once every this many reservations.
const SWEEP_EVERY: u64 = 64;

/// Handle to one reserved charge, used to settle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reservation(u64);

/// One billed call in an account's window.
#[derive(Debug, Clone, Copy)]
struct Charge {
    id: u64,
    at: Instant,
    amount: Decimal,
}

/// Sliding window of charges for one account.
#[derive(Debug, Default)]
struct SpendWindow {
    charges: VecDeque<Charge>,
}

impl SpendWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.charges.front() {
            if now.saturating_duration_since(front.at) >= window {
                self.charges.pop_front();
            } else {
                break;
            }
        }
    }

    fn spent(&self) -> Decimal {
        self.charges.iter().map(|c| c.amount).sum::<Decimal>()
    }

    fn calls(&self) -> u32 {
        self.charges.len() as u32
    }

    fn is_empty(&self) -> bool {
        self.charges.is_empty()
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, SpendWindow>,
    next_id: u64,
    reservations: u64,
}

/// Budget position of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUsage {
    /// Spend inside the window
    pub spent: Decimal,
    /// Billed calls inside the window
    pub calls: u32,
    /// Ceiling for the window
    pub ceiling: Decimal,
    /// `ceiling - spent`, never negative
    pub remaining: Decimal,
    /// Window length in seconds
    pub window_secs: u64,
}

/// Per-account spend ledger over a rolling window.
#[derive(Debug)]
pub struct BudgetLedger {
    window: Duration,
    default_ceiling: Decimal,
    ceilings: HashMap<String, Decimal>,
    state: Mutex<LedgerState>,
}

impl BudgetLedger {
    /// Create a ledger.
    ///
    /// # Arguments
    ///
    /// * `window` - Rolling window length
    /// * `default_ceiling` - Ceiling for accounts not in `ceilings`
    /// * `ceilings` - Per-account ceilings
    pub fn new(
        window: Duration,
        default_ceiling: Decimal,
        ceilings: HashMap<String, Decimal>,
    ) -> Self {
        Self {
            window,
            default_ceiling,
            ceilings,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ceiling(&self, account_id: &str) -> Decimal {
        self.ceilings
            .get(account_id)
            .copied()
            .unwrap_or(self.default_ceiling)
    }

    /// Current usage of an account.
    pub fn usage(&self, account_id: &str) -> BudgetUsage {
        let now = Instant::now();
        let mut state = self.lock();
        let (spent, calls) = match state.accounts.get_mut(account_id) {
            Some(window) => {
                window.prune(now, self.window);
                (window.spent(), window.calls())
            }
            None => (Decimal::ZERO, 0),
        };
        let ceiling = self.ceiling(account_id);
        BudgetUsage {
            spent,
            calls,
            ceiling,
            remaining: (ceiling - spent).max(Decimal::ZERO),
            window_secs: self.window.as_secs(),
        }
    }

    /// Atomically check `estimated` against the remaining budget and record it.
    ///
    /// # Errors
    ///
    /// [`AdsError::BudgetExceeded`] if the estimate does not fit; nothing is recorded.
    pub fn try_reserve(&self, account_id: &str, estimated: Decimal) -> Result<Reservation, AdsError> {
        let now = Instant::now();
        let ceiling = self.ceiling(account_id);
        let mut state = self.lock();

        state.reservations += 1;
        if state.reservations % SWEEP_EVERY == 0 {
            Self::sweep(&mut state.accounts, now, self.window);
        }

        let id = state.next_id;
        let window = state.accounts.entry(account_id.to_string()).or_default();
        window.prune(now, self.window);

        let remaining = (ceiling - window.spent()).max(Decimal::ZERO);
        if estimated > remaining {
            tracing::warn!(
                account_id,
                %estimated,
                %remaining,
                "query rejected by budget"
            );
            return Err(AdsError::BudgetExceeded {
                estimated,
                remaining,
            });
        }

        window.charges.push_back(Charge {
            id,
            at: now,
            amount: estimated,
        });
        state.next_id += 1;
        Ok(Reservation(id))
    }

    /// Replace a reservation's amount with the billed cost; zero refunds it.
    ///
    /// The charge keeps its original timestamp. A reservation that already
    /// rolled out of the window is left alone.
    pub fn settle(&self, account_id: &str, reservation: Reservation, cost: Decimal) {
        let mut state = self.lock();
        let charge = state
            .accounts
            .get_mut(account_id)
            .and_then(|window| window.charges.iter_mut().find(|c| c.id == reservation.0));
        if let Some(charge) = charge {
            charge.amount = cost.max(Decimal::ZERO);
        }
    }

    /// Drop windows with no live charges.
    pub fn cleanup(&self) {
        let now = Instant::now();
        Self::sweep(&mut self.lock().accounts, now, self.window);
    }

    fn sweep(accounts: &mut HashMap<String, SpendWindow>, now: Instant, window: Duration) {
        accounts.retain(|_, spend| {
            spend.prune(now, window);
            !spend.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> BudgetLedger {
        let mut ceilings = HashMap::new();
        ceilings.insert("small".to_string(), Decimal::new(5, 0));
        BudgetLedger::new(Duration::from_secs(3600), Decimal::new(100, 0), ceilings)
    }

    #[test]
    fn test_reserve_within_budget_records_spend_and_call() {
        let ledger = ledger();
        ledger.try_reserve("small", Decimal::new(3, 0)).unwrap();

        let usage = ledger.usage("small");
        assert_eq!(usage.spent, Decimal::new(3, 0));
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.remaining, Decimal::new(2, 0));
        assert_eq!(usage.ceiling, Decimal::new(5, 0));
    }

    #[test]
    fn test_over_budget_is_rejected_and_not_recorded() {
        let ledger = ledger();
        let err = ledger.try_reserve("small", Decimal::new(125, 1)).unwrap_err();
        match err {
            AdsError::BudgetExceeded {
                estimated,
                remaining,
            } => {
                assert_eq!(estimated, Decimal::new(125, 1));
                assert_eq!(remaining, Decimal::new(5, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.usage("small").calls, 0);
    }

    #[test]
    fn test_refund_keeps_the_call() {
        let ledger = ledger();
        let reservation = ledger.try_reserve("small", Decimal::new(4, 0)).unwrap();
        ledger.settle("small", reservation, Decimal::ZERO);

        let usage = ledger.usage("small");
        assert_eq!(usage.spent, Decimal::ZERO);
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.remaining, Decimal::new(5, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls() {
        let ledger = ledger();
        ledger.try_reserve("small", Decimal::new(5, 0)).unwrap();
        assert!(ledger.try_reserve("small", Decimal::new(1, 0)).is_err());

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(ledger.try_reserve("small", Decimal::new(1, 0)).is_ok());
        assert_eq!(ledger.usage("small").calls, 1);
    }

    #[test]
    fn test_accounts_are_independent() {
        let ledger = ledger();
        ledger.try_reserve("small", Decimal::new(5, 0)).unwrap();
        assert!(ledger.try_reserve("other", Decimal::new(50, 0)).is_ok());
        assert_eq!(ledger.usage("other").remaining, Decimal::new(50, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_idle_accounts() {
        let ledger = ledger();
        ledger.try_reserve("small", Decimal::ONE).unwrap();
        tokio::time::advance(Duration::from_secs(7200)).await;
        ledger.cleanup();
        assert!(ledger.lock().accounts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_charge_leaves_window_at_reservation_time() {
        let ledger = ledger();
        let first = ledger.try_reserve("small", Decimal::new(4, 0)).unwrap();

        tokio::time::advance(Duration::from_secs(1800)).await;
        ledger.settle("small", first, Decimal::new(2, 0));
        ledger.try_reserve("small", Decimal::new(3, 0)).unwrap();
        assert_eq!(ledger.usage("small").remaining, Decimal::ZERO);

        // Only the second charge is left once the first one rolls out
        tokio::time::advance(Duration::from_secs(1800)).await;
        let usage = ledger.usage("small");
        assert_eq!(usage.spent, Decimal::new(3, 0));
        assert_eq!(usage.remaining, Decimal::new(2, 0));
        assert_eq!(usage.calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_accounts_are_swept_by_reservations() {
        let ledger = ledger();
        for i in 0..10 {
            ledger.try_reserve(&format!("idle-{}", i), Decimal::ONE).unwrap();
        }
        assert_eq!(ledger.lock().accounts.len(), 10);

        tokio::time::advance(Duration::from_secs(7200)).await;
        for _ in 0..SWEEP_EVERY {
            ledger.try_reserve("busy", Decimal::ZERO).unwrap();
        }

        let state = ledger.lock();
        assert_eq!(state.accounts.len(), 1);
        assert!(state.accounts.contains_key("busy"));
    }

    #[test]
    fn test_concurrent_reservations_cannot_overspend() {
        let ledger = std::sync::Arc::new(ledger());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.try_reserve("small", Decimal::new(3, 0)).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(ledger.usage("small").spent, Decimal::new(3, 0));
    }
}
