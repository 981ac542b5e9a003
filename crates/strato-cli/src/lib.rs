//! Shared simulation code for the CLI tools.

pub mod sim;
