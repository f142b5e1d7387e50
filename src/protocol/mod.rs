//! Protocol layer for the chat relay
//!
//! This module provides:
//! - Two-state framing over the mixed text/binary byte stream
//! - Typed command parsing for routed text lines

pub mod command;
pub mod framer;

// Re-export commonly used types
pub use command::{Command, Destination, MAX_NAME_LEN, ParseError, parse, valid_name};
pub use framer::{Framer, MAX_LINE_LEN, Unit};
