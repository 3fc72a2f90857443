//! Mirrors RSS/Atom feed entries into a sqlite document store and serves
//! feed management and statistics over http.

pub mod api;
pub mod app;
pub mod blacklist;
pub mod config;
pub mod database;
pub mod discovery;
pub mod error;
pub mod jobs;
pub mod mirror;
pub mod normalize;
pub mod opml;
pub mod reader;
pub mod repository;
pub mod services;
pub mod stats;
