//! COVID-19 Dashboard
//!
//! Fetches the ECDC worldwide case distribution together with ISO country
//! codes and a continent/region table, merges them into one row per country
//! per date with derived metrics, and builds animated chart configurations
//! from the result.

pub mod charts;
pub mod config;
pub mod data;
