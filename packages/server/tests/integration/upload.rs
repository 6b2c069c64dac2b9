use crate::common::{SKETCH, TestApp, routes};

mod uploads {
    use super::*;

    #[tokio::test]
    async fn uploaded_sketch_is_served_back_with_its_content_type() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");

        let blob_ref = app.upload_sketch(&token, SKETCH).await;

        let res = app
            .client
            .get(app.url(&routes::blob(&blob_ref)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers()["content-type"], "image/png");
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
        let etag = res.headers()["etag"].to_str().unwrap().to_string();
        assert_eq!(res.bytes().await.unwrap().as_ref(), SKETCH);

        let cached = app
            .client
            .get(app.url(&routes::blob(&blob_ref)))
            .header("If-None-Match", etag)
            .send()
            .await
            .unwrap();
        assert_eq!(cached.status().as_u16(), 304);
    }

    #[tokio::test]
    async fn write_url_points_at_the_upload_route() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");

        let res = app.post_without_body(routes::UPLOADS, &token).await;

        assert_eq!(res.status, 201);
        let blob_ref = res.body["blob_ref"].as_str().unwrap();
        assert_eq!(
            res.body["write_url"],
            app.url(&routes::upload(blob_ref)).as_str()
        );
    }

    #[tokio::test]
    async fn handle_is_not_served_before_upload() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let handle = app.post_without_body(routes::UPLOADS, &token).await;
        let blob_ref = handle.body["blob_ref"].as_str().unwrap();

        let res = app.get_without_token(&routes::blob(blob_ref)).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn handle_accepts_one_upload_from_its_owner_only() {
        let app = TestApp::spawn().await;
        let alice = app.token_for("alice");
        let mallory = app.token_for("mallory");
        let handle = app.post_without_body(routes::UPLOADS, &alice).await;
        let path = routes::upload(handle.body["blob_ref"].as_str().unwrap());

        let stolen = app
            .put_bytes_with_token(&path, SKETCH, "image/png", &mallory)
            .await;
        assert_eq!(stolen.status, 403);
        assert_eq!(stolen.body["code"], "PERMISSION_DENIED");

        let first = app
            .put_bytes_with_token(&path, SKETCH, "image/png", &alice)
            .await;
        assert_eq!(first.status, 201);

        let second = app
            .put_bytes_with_token(&path, b"other", "image/png", &alice)
            .await;
        assert_eq!(second.status, 409);
        assert_eq!(second.body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn non_image_uploads_are_rejected_and_never_served() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");
        let handle = app.post_without_body(routes::UPLOADS, &token).await;
        let blob_ref = handle.body["blob_ref"].as_str().unwrap();
        let path = routes::upload(blob_ref);
        let page = b"<html><script>alert(document.cookie)</script></html>";

        for content_type in ["text/html", "image/svg+xml", "application/octet-stream"] {
            let res = app.put_bytes_with_token(&path, page, content_type, &token).await;
            assert_eq!(res.status, 400, "{content_type} was accepted");
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }
        assert_eq!(app.stored_blob_count(), 0);
        let served = app.get_without_token(&routes::blob(blob_ref)).await;
        assert_eq!(served.status, 404);

        let png = app
            .put_bytes_with_token(&path, SKETCH, "image/png", &token)
            .await;
        assert_eq!(png.status, 201);
    }

    #[tokio::test]
    async fn empty_and_oversized_uploads_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token_for("alice");

        let handle = app.post_without_body(routes::UPLOADS, &token).await;
        let path = routes::upload(handle.body["blob_ref"].as_str().unwrap());
        let empty = app.put_bytes_with_token(&path, b"", "image/png", &token).await;
        assert_eq!(empty.status, 400);
        assert_eq!(empty.body["code"], "VALIDATION_ERROR");

        let oversized = vec![0u8; 64 * 1024 + 1];
        let res = app
            .put_bytes_with_token(&path, &oversized, "image/png", &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(app.stored_blob_count(), 0);
    }
}
