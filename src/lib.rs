//! Lisbon Insights - Airbnb listings, reviews & parish aggregation engine
//!
//! Loads the Lisbon datasets once, builds immutable derived tables and serves
//! filtered view tables to the dashboard front-end.

pub mod config;
pub mod data;
pub mod stats;
pub mod views;
