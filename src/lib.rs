//! Grant Platform backend core
//!
//! This library implements the asynchronous job lifecycle and quota/admission
//! control for the grant-platform backend: file ingestion jobs, proposal
//! section regeneration jobs, and the per-user quota ledger that gates both.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
