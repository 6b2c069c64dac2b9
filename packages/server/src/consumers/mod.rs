pub mod generation_dlq;

pub use generation_dlq::consume_generation_dlq;
