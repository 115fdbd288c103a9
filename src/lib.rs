//! Draftsmith — a conversational requirements-document generator.
//!
//! Single Rust binary. You describe a product idea in the terminal; a remote
//! draft service asks a handful of clarifying questions and then produces a
//! structured requirements document. The core of the crate is the
//! conversation state machine in [`conversation`]; everything else is glue
//! around it.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod config;
pub mod credentials;
pub mod document;
pub mod logging;
pub mod prompt;
pub mod service;

pub mod conversation;
