//! Shared domain models and request/response DTOs.
//!
//! Kept free of storage and HTTP concerns so both `chatter-db` and
//! `chatter-api` can depend on it.

pub mod api;
pub mod models;
