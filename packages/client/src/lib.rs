//! Client side of the generation feed: an HTTP API client and an optimistic
//! cache that reconciles local mutations with authoritative snapshots.

pub mod api;
pub mod cache;
pub mod session;

pub use api::{ApiClient, ClientError, FeedBackend};
pub use cache::{FeedCache, FeedCommand, MutationToken};
pub use session::Session;
