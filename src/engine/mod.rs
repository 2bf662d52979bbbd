//! Trading engine — per-position decision logic and the polling loop.

pub mod position;
pub mod trader;
