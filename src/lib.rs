//! Render manager for mixed text/LaTeX tutoring content.
//!
//! Content fragments produced by an LLM are classified, scheduled through a
//! single serialized typesetting worker, cached by content and mode, and
//! written back into a [`dom::Document`]. See [`application::render`] for the
//! public entry points.

pub mod application;
pub mod cache;
pub mod config;
pub mod dom;
pub mod domain;
pub mod infra;
pub(crate) mod util;
