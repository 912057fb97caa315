//! Risk domain: limits, portfolio view, statistics and the gatekeeper.

mod assessment;
mod gatekeeper;
mod limits;
mod portfolio;
pub mod statistics;

pub use assessment::{
    CheckStatus, RiskAssessment, RiskCheck, RiskCheckKind, RiskMetrics, TradeIntent, VarMethod,
};
pub use gatekeeper::{MIN_CORRELATION_POINTS, RiskGatekeeper};
pub use limits::{AssetClassProfile, RiskLimits};
pub use portfolio::{PortfolioState, Position, PositionSide, TradeOutcome, to_f64};
