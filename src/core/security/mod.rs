#![forbid(unsafe_code)]

//! Ownership proofs for stored records.

pub mod signing;
