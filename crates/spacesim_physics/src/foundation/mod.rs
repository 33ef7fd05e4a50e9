//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Handle types for generation-checked references
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod logging;
