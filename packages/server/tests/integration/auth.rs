use crate::common::{JWT_SECRET, TestApp, routes};
use server::utils::jwt::{self, Claims};

mod identity {
    use super::*;

    #[tokio::test]
    async fn me_returns_the_token_identity() {
        let app = TestApp::spawn().await;
        let mut claims = Claims::new("alice", chrono::Duration::hours(1));
        claims.name = Some("Alice".into());
        claims.email = Some("alice@example.com".into());
        let token = jwt::sign(&claims, JWT_SECRET).unwrap();

        let res = app.get_with_token(routes::ME, &token).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["id"], "alice");
        assert_eq!(res.body["name"], "Alice");
        assert_eq!(res.body["email"], "alice@example.com");
        assert!(res.body["image"].is_null());
    }
}

mod rejection {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::GENERATIONS).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_rejected() {
        let app = TestApp::spawn().await;
        let forged = jwt::sign(
            &Claims::new("alice", chrono::Duration::hours(1)),
            "not-the-secret",
        )
        .unwrap();

        let res = app.get_with_token(routes::ME, &forged).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let app = TestApp::spawn().await;
        let expired = jwt::sign(
            &Claims::new("alice", chrono::Duration::hours(-2)),
            JWT_SECRET,
        )
        .unwrap();

        let res = app.get_with_token(routes::GENERATIONS, &expired).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn unauthenticated_create_leaves_no_job() {
        let app = TestApp::spawn().await;

        let res = app
            .client
            .post(app.url(routes::GENERATIONS))
            .json(&serde_json::json!({"prompt": "x", "canvas_ref": uuid::Uuid::new_v4()}))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 401);
        assert!(app.jobs.by_owner("alice").await.unwrap().is_empty());
    }
}

mod docs {
    use super::*;

    #[tokio::test]
    async fn openapi_document_lists_generation_routes() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::OPENAPI).await;

        assert_eq!(res.status, 200);
        let paths = res.body["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/v1/generations/{id}/toggle-save"));
        assert!(paths.contains_key("/api/v1/uploads/{blob_ref}"));
        assert!(res.body["components"]["securitySchemes"]["jwt"].is_object());
    }
}
