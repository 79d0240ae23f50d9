//! Core components, types, and utilities for beebot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Fixed reply texts.
//! - Common types, errors, and result handling.

pub mod config;
pub mod messages;
pub mod types;
