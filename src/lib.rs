//! Gatehouse: guided onboarding interviews for community platforms.

pub mod admin;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod interview;
pub mod platform;
pub mod routes;
