//! Core types shared by every dynmap crate

pub mod types;
