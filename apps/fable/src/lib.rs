//! # Fable
//!
//! Command line front end over `fable-core`: file I/O, configuration and
//! concurrent compile/decompile jobs. All pack semantics live in the core.

pub mod cli;
pub mod config;
