//! Domain types - configuration and the hash space being scanned
//!
//! These types carry no I/O; the probe and scan modules build on them.

pub mod config;
pub mod hash_space;
