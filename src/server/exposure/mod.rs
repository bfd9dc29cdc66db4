//! API exposure
//!
//! Each exposure consumes the registered resource modules and produces a
//! Router for its protocol.

pub mod rest;

pub use rest::RestExposure;
