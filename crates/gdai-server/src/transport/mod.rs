//! Transports the adapter can be served over

pub mod stdio;
