//! SeaORM entity definitions for the marketplace tables.

pub mod prelude;

pub mod chat;
pub mod message;
pub mod offer;
pub mod review;
pub mod task;
pub mod user;
