//! Order Management System (OMS)
//!
//! Live order flow against an [`ExchangeGateway`](crate::exchange::ExchangeGateway):
//! - Opening positions with tick-offset limit or market orders
//! - Cancelling and inspecting orders
//! - Closing positions with reduce-only orders

pub mod closer;
pub mod orchestrator;

pub use closer::{CloseMode, CloseOutcome, PositionCloser};
pub use orchestrator::{
    FillState, OrchestratorConfig, OrderFailure, OrderOrchestrator, OrderStage,
};
