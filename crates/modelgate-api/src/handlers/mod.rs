//! API route handlers

pub mod chat;
pub mod health;
pub mod info;
pub mod models;
