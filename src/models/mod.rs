//! Data structures shared by the decoder, the filters, and the tools.
pub mod bgp;
pub mod mrt;
pub mod network;

pub use bgp::*;
pub use mrt::*;
pub use network::*;
