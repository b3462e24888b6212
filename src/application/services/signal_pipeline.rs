//! SignalPipeline service - runs a strategy signal through admission,
//! sizing and execution
//!
//! This is the signal → risk gate → sizer → gateway → lot accountant flow
//! in one place. The pipeline never treats a denied or suppressed signal as
//! an error; those are normal outcomes the caller logs and moves past.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::application::services::execution_gateway::{ExecutionGateway, PlacedOrder};
use crate::domain::entities::position::PositionSide;
use crate::domain::entities::signal::TradeSignal;
use crate::domain::errors::ExecutionError;
use crate::domain::services::lot_accountant::LotAccountant;
use crate::domain::services::position_sizer::PositionSizer;
use crate::domain::services::risk_gate::RiskGate;

/// Terminal state of one handled signal.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    /// The risk gate refused the symbol on portfolio correlation.
    Denied {
        max_correlation: f64,
        most_correlated: Option<String>,
    },
    /// The kill switch or bankruptcy guard blocked order submission.
    Suppressed,
    Executed {
        order: PlacedOrder,
        risk_fraction: f64,
    },
}

pub struct SignalPipeline {
    risk_gate: Arc<RiskGate>,
    sizer: PositionSizer,
    gateway: Arc<ExecutionGateway>,
    accountant: Arc<Mutex<LotAccountant>>,
    base_risk_fraction: f64,
}

impl SignalPipeline {
    pub fn new(
        risk_gate: Arc<RiskGate>,
        sizer: PositionSizer,
        gateway: Arc<ExecutionGateway>,
        accountant: Arc<Mutex<LotAccountant>>,
        base_risk_fraction: f64,
    ) -> Self {
        SignalPipeline {
            risk_gate,
            sizer,
            gateway,
            accountant,
            base_risk_fraction,
        }
    }

    /// Handle one signal end to end. `confidence` is the strategy's own
    /// conviction in [0, 1], when it reports one.
    pub async fn handle(
        &self,
        signal: &TradeSignal,
        confidence: Option<f64>,
    ) -> Result<SignalOutcome, ExecutionError> {
        let active_symbols = self.gateway.active_symbols().await;
        let admission = self
            .risk_gate
            .admit(&signal.symbol, &active_symbols)
            .await?;
        if !admission.admitted {
            info!(
                symbol = %signal.symbol,
                max_correlation = admission.max_correlation,
                "Signal denied by risk gate"
            );
            return Ok(SignalOutcome::Denied {
                max_correlation: admission.max_correlation,
                most_correlated: admission.most_correlated,
            });
        }

        let risk_fraction = self
            .risk_gate
            .dynamic_risk(self.base_risk_fraction, confidence)
            .await;
        let equity = self.gateway.balance().await?;

        let amount = match signal.size {
            Some(fixed) => fixed,
            None => self
                .sizer
                .size(equity, risk_fraction, signal.entry_price, signal.stop_loss)?,
        };

        let placed = match self.gateway.place_order(signal, amount).await? {
            Some(order) => order,
            None => return Ok(SignalOutcome::Suppressed),
        };

        // A long fill purchases the asset: record the lot so cost-basis
        // tracking stays complete. Failing to record is loud but does not
        // undo the fill.
        if signal.side == PositionSide::Long {
            let mut accountant = self.accountant.lock().await;
            if let Err(e) = accountant
                .record_buy(placed.amount, placed.fill_price, &signal.strategy, None)
                .await
            {
                error!(
                    order_id = %placed.order_id,
                    error = %e,
                    "Fill executed but lot recording failed"
                );
            }
        }

        Ok(SignalOutcome::Executed {
            order: placed,
            risk_fraction,
        })
    }
}
