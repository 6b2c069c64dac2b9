pub mod auth;
pub mod generation;
pub mod live;
pub mod upload;
