//! Cyclone - A Pinterest-style image pinboard
//!
//! Users post image pins into categories, collect them on boards, save
//! other people's pins and follow each other.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod templates;
