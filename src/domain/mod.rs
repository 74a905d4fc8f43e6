//! Tools served by this process
//!
//! Holds the concrete tool implementations and the registry they are loaded into at startup.

pub mod tools;
