//! Application services.

pub mod render;
