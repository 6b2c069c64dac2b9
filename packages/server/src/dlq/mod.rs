mod service;
mod stuck;

pub use service::{DbDeadLetterSink, DlqService};
pub use stuck::{detect_stuck_jobs, run_stuck_job_detector};
