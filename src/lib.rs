//! Receipt Guard library.
//!
//! This library detects re-submitted payment receipt images, either
//! byte-identical copies or visually similar re-saves.

pub mod commands;
pub mod error;
pub mod services;
