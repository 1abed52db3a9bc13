// toot-mirror: one-way relay from a Mastodon account to a Twitter account.
//
// Each invocation fetches the newest posts, works out which ones are new
// since the last run, and mirrors them oldest first with a back-link.

pub mod config;
pub mod error;
pub mod links;
pub mod mastodon;
pub mod model;
pub mod publish;
pub mod reconcile;
pub mod state;
pub mod sync;
pub mod text;
pub mod twitter;
