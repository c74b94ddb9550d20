//! routr CLI library.
//!
//! Subcommand arguments and handlers plus output formatting, kept out of
//! `main.rs` so they can be unit tested.

pub mod commands;
pub mod output;
