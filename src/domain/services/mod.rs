pub mod lot_accountant;
pub mod position_sizer;
pub mod risk_gate;
