// src/core/handler/actions/mod.rs

//! Command handlers grouped by the collaborator they talk to.

pub mod pubsub;
pub mod store;
