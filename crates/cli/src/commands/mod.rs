//! CLI Commands

pub mod check;
pub mod cleanup;
pub mod provision;
