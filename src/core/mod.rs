//! Core modules for the ledger's storage and change capture.
//!
//! Everything that is not specific to one entity kind lives here: the store
//! and its configuration, the database broker, the generic row layer and the
//! change capture engine.

pub mod broker;
pub mod capture;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod logging;
pub mod output;
pub mod schemas;
pub mod store;
pub mod time;
