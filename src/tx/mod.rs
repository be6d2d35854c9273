//! Transaction preparation helpers: gas safety buffers and ERC-20 calldata

pub mod erc20;
mod gas;

pub use gas::GasEstimator;
