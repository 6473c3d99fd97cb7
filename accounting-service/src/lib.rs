//! Accounting Service - double-entry ledger engine for the property suite.

pub mod config;
pub mod http;
pub mod models;
pub mod services;
pub mod startup;
pub mod store;
