//! Flowline CLI library: the command implementations behind the `flowline`
//! binary, exposed so integration tests can drive them directly.

pub mod commands;
