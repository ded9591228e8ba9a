//! Integration test suites.

mod manager;
mod pipeline;
mod properties;
mod pull;
