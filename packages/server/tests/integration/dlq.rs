use common::blobs::BlobRef;
use common::generation::Generation;
use server::dlq::detect_stuck_jobs;
use worker::MemoryDeadLetterSink;

use crate::common::{StubBehavior, TestApp, routes};

mod retries {
    use super::*;

    #[tokio::test]
    async fn unavailable_model_is_retried_then_failed() {
        let app = TestApp::spawn_with(StubBehavior::Unavailable).await;
        let token = app.token_for("alice");

        let id = app.create_generation(&token, "volcano").await;

        let failed = app.wait_for_status(&id, &token, "Failed").await;
        assert_eq!(failed["error_code"], "MAX_RETRIES_EXCEEDED");
        assert!(failed["result_image_url"].is_null());
        // One attempt plus two retries.
        assert_eq!(app.model.generate_calls(), 3);
    }
}

mod stuck_jobs {
    use super::*;

    #[tokio::test]
    async fn stale_processing_job_is_failed_and_dead_lettered() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let mut stale = Generation::new("alice", "forgotten", BlobRef::new());
        stale.created_at -= chrono::Duration::hours(1);
        stale.updated_at = stale.created_at;
        app.jobs.insert(stale.clone()).await.unwrap();
        let sink = MemoryDeadLetterSink::new();

        let failed = detect_stuck_jobs(app.jobs.as_ref(), &sink, 60).await.unwrap();

        assert_eq!(failed, 1);
        let view = app
            .get_with_token(&routes::generation(&stale.id.to_string()), &token)
            .await;
        assert_eq!(view.body["status"], "Failed");
        assert_eq!(view.body["error_code"], "STUCK_JOB");

        let envelopes = sink.envelopes().await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].generation_id, Some(stale.id));
    }

    #[tokio::test]
    async fn completed_jobs_are_left_alone() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "quick").await;
        app.wait_for_status(&id, &token, "Completed").await;
        let sink = MemoryDeadLetterSink::new();

        let failed = detect_stuck_jobs(app.jobs.as_ref(), &sink, 0).await.unwrap();

        assert_eq!(failed, 0);
        assert!(sink.envelopes().await.is_empty());
    }
}
