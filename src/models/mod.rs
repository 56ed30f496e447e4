// src/models/mod.rs
//! Data structures exchanged between the registration components.

pub mod credentials;
pub mod did;
