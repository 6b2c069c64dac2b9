use std::time::Duration;

use serde_json::{Value, json};

use crate::common::{GENERATED_IMAGE, SKETCH, StubBehavior, TestApp, routes};

fn ids(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].as_str().unwrap().to_string())
        .collect()
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn successful_generation_completes_with_a_result_image() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");

        let id = app.create_generation(&token, "  a red circle  ").await;

        let created = app.get_with_token(&routes::generation(&id), &token).await;
        assert_eq!(created.body["owner_id"], "alice");
        assert_eq!(created.body["prompt"], "a red circle");
        assert_eq!(created.body["is_saved"], false);

        let done = app.wait_for_status(&id, &token, "Completed").await;
        assert!(done["error_code"].is_null());
        assert!(done["canvas_image_url"].is_string());
        let created_at: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(done["created_at"].clone()).unwrap();
        let updated_at: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(done["updated_at"].clone()).unwrap();
        assert!(updated_at > created_at);

        let result_url = done["result_image_url"].as_str().unwrap();
        let image = app.client.get(result_url).send().await.unwrap();
        assert_eq!(image.status().as_u16(), 200);
        assert_eq!(image.bytes().await.unwrap().as_ref(), GENERATED_IMAGE);
        assert_eq!(app.model.generate_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_input_fails_without_retry_or_result() {
        let app = TestApp::spawn_with(StubBehavior::Reject).await;
        let token = app.token_for("alice");

        let id = app.create_generation(&token, "something forbidden").await;

        let failed = app.wait_for_status(&id, &token, "Failed").await;
        assert_eq!(failed["error_code"], "UPSTREAM_REJECTED");
        assert!(failed["result_image_url"].is_null());
        assert_eq!(app.model.generate_calls(), 1);
    }

    #[tokio::test]
    async fn finished_job_never_changes_status_again() {
        let app = TestApp::spawn_with(StubBehavior::Reject).await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "storm").await;
        app.wait_for_status(&id, &token, "Failed").await;

        let toggled = app
            .post_without_body(&routes::toggle_save(&id), &token)
            .await;

        assert_eq!(toggled.status, 200);
        assert_eq!(toggled.body["status"], "Failed");
        assert_eq!(toggled.body["is_saved"], true);
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn empty_or_oversized_prompt_is_rejected_before_any_state_change() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let canvas_ref = app.upload_sketch(&token, SKETCH).await;

        let too_long = "x".repeat(1001);
        for prompt in ["", "   ", too_long.as_str()] {
            let res = app
                .post_with_token(
                    routes::GENERATIONS,
                    &json!({"prompt": prompt, "canvas_ref": canvas_ref}),
                    &token,
                )
                .await;
            assert_eq!(res.status, 400, "prompt {prompt:?}");
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }

        let list = app.get_with_token(routes::GENERATIONS, &token).await;
        assert_eq!(list.body, json!([]));
        assert_eq!(app.model.generate_calls(), 0);
    }

    #[tokio::test]
    async fn canvas_must_be_an_unused_upload_of_the_caller() {
        let app = TestApp::spawn().await;
        let alice = app.token_for("alice");
        let bob = app.token_for("bob");

        let unknown = app
            .post_with_token(
                routes::GENERATIONS,
                &json!({"prompt": "owl", "canvas_ref": uuid::Uuid::new_v4()}),
                &alice,
            )
            .await;
        assert_eq!(unknown.status, 404);

        let pending = app.post_without_body(routes::UPLOADS, &alice).await;
        let not_uploaded = app
            .post_with_token(
                routes::GENERATIONS,
                &json!({"prompt": "owl", "canvas_ref": pending.body["blob_ref"]}),
                &alice,
            )
            .await;
        assert_eq!(not_uploaded.status, 400);

        let bobs_sketch = app.upload_sketch(&bob, SKETCH).await;
        let foreign = app
            .post_with_token(
                routes::GENERATIONS,
                &json!({"prompt": "owl", "canvas_ref": bobs_sketch}),
                &alice,
            )
            .await;
        assert_eq!(foreign.status, 403);
        assert_eq!(foreign.body["code"], "PERMISSION_DENIED");

        let mine = app.upload_sketch(&alice, SKETCH).await;
        let body = json!({"prompt": "owl", "canvas_ref": mine});
        let first = app.post_with_token(routes::GENERATIONS, &body, &alice).await;
        assert_eq!(first.status, 201);
        let reused = app.post_with_token(routes::GENERATIONS, &body, &alice).await;
        assert_eq!(reused.status, 409);
        assert_eq!(reused.body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn malformed_body_gets_a_structured_error() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");

        let res = app
            .post_with_token(routes::GENERATIONS, &json!({"prompt": "owl"}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn non_owner_cannot_read_delete_or_toggle() {
        let app = TestApp::spawn().await;
        let alice = app.token_for("alice");
        let mallory = app.token_for("mallory");
        let id = app.create_generation(&alice, "forest").await;
        let before = app.wait_for_status(&id, &alice, "Completed").await;

        let get = app.get_with_token(&routes::generation(&id), &mallory).await;
        assert_eq!(get.status, 403);

        let delete = app
            .delete_with_token(&routes::generation(&id), &mallory)
            .await;
        assert_eq!(delete.status, 403);
        assert_eq!(delete.body["code"], "PERMISSION_DENIED");

        let toggle = app
            .post_without_body(&routes::toggle_save(&id), &mallory)
            .await;
        assert_eq!(toggle.status, 403);

        let after = app.get_with_token(&routes::generation(&id), &alice).await;
        assert_eq!(after.body, before);
    }

    #[tokio::test]
    async fn feeds_only_show_the_callers_jobs() {
        let app = TestApp::spawn().await;
        let alice = app.token_for("alice");
        let bob = app.token_for("bob");
        let alices = app.create_generation(&alice, "alice's").await;
        let bobs = app.create_generation(&bob, "bob's").await;

        let alice_feed = app.get_with_token(routes::GENERATIONS, &alice).await;
        let bob_feed = app.get_with_token(routes::GENERATIONS, &bob).await;

        assert_eq!(ids(&alice_feed.body), vec![alices]);
        assert_eq!(ids(&bob_feed.body), vec![bobs]);
    }

    #[tokio::test]
    async fn unknown_generation_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let missing = uuid::Uuid::now_v7().to_string();

        let res = app
            .delete_with_token(&routes::generation(&missing), &token)
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod saving {
    use super::*;

    #[tokio::test]
    async fn toggling_twice_restores_the_flag() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "harbor").await;

        let first = app.post_without_body(&routes::toggle_save(&id), &token).await;
        assert_eq!(first.status, 200);
        assert_eq!(first.body["is_saved"], true);

        let second = app.post_without_body(&routes::toggle_save(&id), &token).await;
        assert_eq!(second.body["is_saved"], false);
    }

    #[tokio::test]
    async fn saved_feed_is_the_saved_subset_in_feed_order() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let mut created = Vec::new();
        for i in 0..4 {
            created.push(app.create_generation(&token, &format!("job {i}")).await);
        }
        for id in [&created[0], &created[2], &created[3]] {
            app.post_without_body(&routes::toggle_save(id), &token).await;
        }

        let feed = ids(&app.get_with_token(routes::GENERATIONS, &token).await.body);
        let saved = ids(&app.get_with_token(routes::GENERATIONS_SAVED, &token).await.body);

        let expected: Vec<String> = feed
            .iter()
            .filter(|id| **id != created[1])
            .cloned()
            .collect();
        assert_eq!(saved, expected);
    }

    #[tokio::test]
    async fn concurrent_toggles_are_not_lost() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "lighthouse").await;
        let path = routes::toggle_save(&id);

        let calls = 5;
        let results = futures::future::join_all(
            (0..calls).map(|_| app.post_without_body(&path, &token)),
        )
        .await;
        let committed = results.iter().filter(|r| r.status == 200).count();

        let view = app.get_with_token(&routes::generation(&id), &token).await;
        assert_eq!(view.body["is_saved"], committed % 2 == 1);
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn deleting_removes_the_job_and_both_images() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "harbor").await;
        let done = app.wait_for_status(&id, &token, "Completed").await;
        let canvas_url = done["canvas_image_url"].as_str().unwrap().to_string();
        let result_url = done["result_image_url"].as_str().unwrap().to_string();
        assert_eq!(app.stored_blob_count(), 2);

        let res = app.delete_with_token(&routes::generation(&id), &token).await;
        assert_eq!(res.status, 204);

        let get = app.get_with_token(&routes::generation(&id), &token).await;
        assert_eq!(get.status, 404);
        for url in [canvas_url, result_url] {
            let res = app.client.get(url).send().await.unwrap();
            assert_eq!(res.status().as_u16(), 404);
        }
        assert_eq!(app.stored_blob_count(), 0);
    }

    #[tokio::test]
    async fn deleting_while_processing_discards_the_late_result() {
        let app = TestApp::spawn_with(StubBehavior::Gated).await;
        let token = app.token_for("alice");
        let id = app.create_generation(&token, "slow render").await;
        for _ in 0..200 {
            if app.model.generate_calls() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(app.model.generate_calls(), 1);

        let res = app.delete_with_token(&routes::generation(&id), &token).await;
        assert_eq!(res.status, 204);
        app.model.release();

        let mut discarded = false;
        for _ in 0..200 {
            if app.model.downloads() == 1 && app.stored_blob_count() == 0 {
                discarded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(discarded, "late result was not discarded");

        let job_id = id.parse().unwrap();
        assert!(app.jobs.get(job_id).await.unwrap().is_none());
    }
}

mod pagination {
    use super::*;

    #[tokio::test]
    async fn pages_of_two_cover_five_jobs_newest_first() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(app.create_generation(&token, &format!("job {i}")).await);
        }
        created.reverse();

        let mut seen = Vec::new();
        let mut sizes = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let res = app
                .get_with_token(&routes::page(cursor.as_deref(), 2), &token)
                .await;
            assert_eq!(res.status, 200, "{}", res.text);
            let items = ids(&res.body["items"]);
            sizes.push(items.len());
            seen.extend(items);
            match res.body["next_cursor"].as_str() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(seen, created);
    }

    #[tokio::test]
    async fn new_jobs_do_not_shift_later_pages() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let mut created = Vec::new();
        for i in 0..3 {
            created.push(app.create_generation(&token, &format!("job {i}")).await);
        }

        let first = app.get_with_token(&routes::page(None, 2), &token).await;
        let cursor = first.body["next_cursor"].as_str().unwrap().to_string();
        app.create_generation(&token, "newer").await;

        let second = app
            .get_with_token(&routes::page(Some(&cursor), 2), &token)
            .await;
        assert_eq!(ids(&second.body["items"]), vec![created[0].clone()]);
        assert!(second.body["next_cursor"].is_null());
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");

        let res = app
            .get_with_token(&routes::page(Some("garbage"), 2), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}
