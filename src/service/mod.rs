//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services beebot talks to:
//! - Chat services (Slack socket mode)
//! - Directory services (Slack user, channel, and emoji lists)
//! - Counter store (SurrealDB)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod directory;
pub mod slack_api;
