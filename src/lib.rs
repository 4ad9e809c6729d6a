#![allow(
    clippy::field_reassign_with_default,
    clippy::new_without_default,
    clippy::too_many_arguments,
    clippy::type_complexity
)]

pub mod app;
pub mod common;
pub mod config;
pub mod engine;
pub mod model;
pub mod store;
pub mod sub;
