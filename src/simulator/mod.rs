//! The Simulator
//!
//! Responsible for:
//! - Executing a provider's swap calldata on the forked node
//! - Turning receipts and balance diffs into a `SimulationResult`
//! - Pricing gas in output-token units

pub mod gas;
pub mod swap_executor;
pub mod types;

pub use gas::{GasAccountant, OutputPricing};
pub use swap_executor::{SwapExecutor, SwapSettings};
pub use types::{SimulationRequest, SimulationResult, SimulationStatus, SwapTransaction};
