//! Blog feed cache library.
//!
//! Normalizes a bundled JSON feed of blog posts, caches the posts in SQLite,
//! and serves them page by page to a list UI.

pub mod bootstrap;
pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod feed;
pub mod links;
pub mod model;
pub mod normalize;
