pub mod auth;
pub mod chat;
pub mod config;
pub mod entities;
pub mod offer;
pub mod review;
pub mod task;
#[cfg(test)]
mod testing;
pub mod user;
pub mod validation;
pub mod web;
