//! API handlers module

pub mod check;
pub mod health;
