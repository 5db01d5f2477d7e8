#![forbid(unsafe_code)]

//! Core value types, configuration and ownership proofs.

pub mod config;
pub mod metadata;
pub mod security;
pub mod types;
