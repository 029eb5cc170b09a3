#![doc = "aidevs-context: markdown sectioning and attachment resolution for AI_Devs tasks."]

//! A document is split into titled sections, the markdown links and images
//! inside them are resolved into text by model collaborators (image
//! descriptions, audio transcriptions), and the result is reassembled into a
//! single `full_context` string for a completion model.
//!
//! # Modules
//! - [`chunker`], [`sections`], [`markdown`]: pure text processing
//! - [`resolve`], [`pipeline`]: async orchestration over the [`contract`] traits
//! - [`providers`], [`cache`], [`verify`]: concrete collaborators
//! - [`questions`]: answering questions from the assembled context
//! - [`load_config`], [`cli`]: configuration and the command-line entrypoint

pub mod cache;
pub mod chunker;
pub mod cli;
pub mod contract;
pub mod load_config;
pub mod markdown;
pub mod pipeline;
pub mod providers;
pub mod questions;
pub mod resolve;
pub mod sections;
pub mod verify;

pub use cli::{run, Cli, Commands};
