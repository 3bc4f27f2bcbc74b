//! Bus device drivers
//!
//! Concrete [`BusDevice`](crate::traits::BusDevice) implementations for the
//! analog front ends fitted to the board.

pub mod ads1115;

pub use ads1115::Ads1115;
