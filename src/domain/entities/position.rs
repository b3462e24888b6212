use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a simulated position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "TP")]
    TakeProfit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "SL"),
            ExitReason::TakeProfit => write!(f, "TP"),
        }
    }
}

/// An open paper-mode position, filled against a live market price and
/// carried in the account ledger until its stop or target is crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPosition {
    pub id: String,
    pub strategy: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub amount: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_time: DateTime<Utc>,
}

impl SimulatedPosition {
    /// Stop-loss trigger test against one price bar.
    ///
    /// A long stops out when the bar's low reaches the stop; a short when
    /// the bar's high reaches it.
    pub fn stop_crossed(&self, candle: &Candle) -> bool {
        match self.side {
            PositionSide::Long => candle.low <= self.stop_loss,
            PositionSide::Short => candle.high >= self.stop_loss,
        }
    }

    /// Take-profit trigger test against one price bar.
    pub fn target_crossed(&self, candle: &Candle) -> bool {
        match self.side {
            PositionSide::Long => candle.high >= self.take_profit,
            PositionSide::Short => candle.low <= self.take_profit,
        }
    }

    /// Realized profit or loss at the given exit price.
    pub fn realized_pnl(&self, exit_price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (exit_price - self.entry_price) * self.amount,
            PositionSide::Short => (self.entry_price - exit_price) * self.amount,
        }
    }

    /// Consume the position into its immutable closed-trade record.
    pub fn close(self, exit_price: f64, exit_time: DateTime<Utc>, reason: ExitReason) -> ClosedTrade {
        let pnl = self.realized_pnl(exit_price);
        ClosedTrade {
            id: self.id,
            strategy: self.strategy,
            symbol: self.symbol,
            side: self.side,
            entry_price: self.entry_price,
            amount: self.amount,
            entry_time: self.entry_time,
            exit_price,
            exit_time,
            exit_reason: reason,
            pnl,
        }
    }
}

/// Immutable record of a realized simulated exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: String,
    pub strategy: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub amount: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(low: f64, high: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: (low + high) / 2.0,
            high,
            low,
            close: (low + high) / 2.0,
            volume: 1.0,
        }
    }

    fn long_position() -> SimulatedPosition {
        SimulatedPosition {
            id: "pos_1".to_string(),
            strategy: "breakout".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: 50000.0,
            amount: 0.1,
            stop_loss: 48000.0,
            take_profit: 55000.0,
            entry_time: Utc::now(),
        }
    }

    #[test]
    fn test_long_stop_crossed_on_low() {
        let position = long_position();
        assert!(!position.stop_crossed(&bar(48500.0, 51000.0)));
        assert!(position.stop_crossed(&bar(47900.0, 51000.0)));
        assert!(position.stop_crossed(&bar(48000.0, 51000.0)));
    }

    #[test]
    fn test_long_target_crossed_on_high() {
        let position = long_position();
        assert!(!position.target_crossed(&bar(49000.0, 54000.0)));
        assert!(position.target_crossed(&bar(49000.0, 55000.0)));
    }

    #[test]
    fn test_short_triggers_mirror_long() {
        let mut position = long_position();
        position.side = PositionSide::Short;
        position.stop_loss = 52000.0;
        position.take_profit = 46000.0;

        assert!(position.stop_crossed(&bar(50000.0, 52100.0)));
        assert!(!position.stop_crossed(&bar(50000.0, 51900.0)));
        assert!(position.target_crossed(&bar(45900.0, 50000.0)));
        assert!(!position.target_crossed(&bar(46100.0, 50000.0)));
    }

    #[test]
    fn test_realized_pnl_long_and_short() {
        let position = long_position();
        assert_eq!(position.realized_pnl(55000.0), 500.0);
        assert_eq!(position.realized_pnl(48000.0), -200.0);

        let mut short = long_position();
        short.side = PositionSide::Short;
        assert_eq!(short.realized_pnl(48000.0), 200.0);
    }

    #[test]
    fn test_close_produces_trade_record() {
        let position = long_position();
        let exit_time = Utc::now();
        let trade = position.clone().close(55000.0, exit_time, ExitReason::TakeProfit);

        assert_eq!(trade.id, position.id);
        assert_eq!(trade.exit_price, 55000.0);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.pnl, 500.0);
    }

    #[test]
    fn test_exit_reason_wire_format() {
        assert_eq!(
            serde_json::to_string(&ExitReason::StopLoss).unwrap(),
            "\"SL\""
        );
        assert_eq!(
            serde_json::to_string(&ExitReason::TakeProfit).unwrap(),
            "\"TP\""
        );
    }
}
