//! Background loops.

pub mod point_persist_loop;
