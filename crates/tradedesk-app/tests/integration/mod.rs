//! Integration test support for tradedesk-app.
//!
//! Shared fixtures for end-to-end feed tests against a local WebSocket server.

pub mod common;
