pub mod blob_ref;
pub mod generation;
