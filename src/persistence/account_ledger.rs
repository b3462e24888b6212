use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::entities::position::{ClosedTrade, SimulatedPosition};

use super::atomic_file::AtomicJsonFile;
use super::StoreError;

/// Persisted paper-trading account state: open simulated positions, the
/// realized-trade history and the running total PnL.
///
/// One instance exists per process; every mutating operation is a
/// read-modify-write under the gateway's lock followed by an atomic save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLedger {
    pub initial_balance: f64,
    pub active_positions: Vec<SimulatedPosition>,
    pub history: Vec<ClosedTrade>,
    pub total_pnl: f64,
}

impl AccountLedger {
    pub fn new(initial_balance: f64) -> Self {
        AccountLedger {
            initial_balance,
            active_positions: Vec::new(),
            history: Vec::new(),
            total_pnl: 0.0,
        }
    }

    /// Paper-account equity: starting balance plus realized PnL.
    pub fn equity(&self) -> f64 {
        self.initial_balance + self.total_pnl
    }

    pub fn open(&mut self, position: SimulatedPosition) {
        self.active_positions.push(position);
    }

    /// Remove an active position by id, handing it back for closing.
    pub fn take_position(&mut self, id: &str) -> Option<SimulatedPosition> {
        let index = self.active_positions.iter().position(|p| p.id == id)?;
        Some(self.active_positions.remove(index))
    }

    /// Record a realized exit into history and the running total.
    pub fn realize(&mut self, trade: ClosedTrade) {
        self.total_pnl += trade.pnl;
        self.history.push(trade);
    }

    /// Sum of realized PnL for trades exited on the given local calendar day.
    pub fn realized_pnl_on(&self, day: NaiveDate) -> f64 {
        self.history
            .iter()
            .filter(|t| t.exit_time.with_timezone(&Local).date_naive() == day)
            .map(|t| t.pnl)
            .sum()
    }
}

/// Durable store for the account ledger
pub struct LedgerStore {
    file: AtomicJsonFile,
}

impl LedgerStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            file: AtomicJsonFile::new(path),
        }
    }

    /// Load the persisted ledger. A missing file starts a fresh account;
    /// an unreadable one is logged and discarded rather than failing
    /// startup.
    pub async fn load_or_new(&self, initial_balance: f64) -> AccountLedger {
        match self.file.load::<AccountLedger>().await {
            Ok(Some(ledger)) => ledger,
            Ok(None) => AccountLedger::new(initial_balance),
            Err(e) => {
                warn!(
                    path = %self.file.path().display(),
                    error = %e,
                    "Discarding unreadable account ledger, starting fresh"
                );
                AccountLedger::new(initial_balance)
            }
        }
    }

    pub async fn save(&self, ledger: &AccountLedger) -> Result<(), StoreError> {
        self.file.save(ledger).await
    }
}
