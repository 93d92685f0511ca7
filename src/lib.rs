//! feedrelay: poll RSS/Atom feeds and relay new items to a Discord-style
//! webhook, remembering per-feed progress in a durable checkpoint.
//!
//! One [`engine::Engine::run`] is one pass over the configured feeds. The
//! binary runs a single pass and exits; scheduling is left to cron or a
//! systemd timer.

pub mod config;
pub mod engine;
pub mod feed;
pub mod notify;
pub mod storage;
pub mod transport;
pub mod util;
