use client::{ApiClient, FeedBackend, Session};
use common::GenerationStatus;

use crate::common::{SKETCH, StubBehavior, TestApp};

fn api_for(app: &TestApp, owner: &str) -> ApiClient {
    ApiClient::new(format!("http://{}", app.addr), app.token_for(owner))
}

#[tokio::test]
async fn upload_and_generate_through_the_api_client() {
    let app = TestApp::spawn().await;
    let api = api_for(&app, "alice");

    let id = api.generate("a red circle", SKETCH.to_vec(), "image/png").await.unwrap();

    let mut view = api.fetch_generation(id).await.unwrap();
    for _ in 0..200 {
        if view.status == GenerationStatus::Completed {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        view = api.fetch_generation(id).await.unwrap();
    }
    assert_eq!(view.status, GenerationStatus::Completed);
    assert_eq!(view.prompt, "a red circle");

    let page = api.fetch_page(None, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn server_errors_surface_as_codes() {
    let app = TestApp::spawn().await;
    let alice = api_for(&app, "alice");
    let mallory = api_for(&app, "mallory");

    let id = alice.generate("mine", SKETCH.to_vec(), "image/png").await.unwrap();

    let err = mallory.toggle_save(id).await.unwrap_err();
    assert_eq!(err.code(), Some("PERMISSION_DENIED"));

    let err = alice.create_generation("   ", common::blobs::BlobRef::new()).await.unwrap_err();
    assert_eq!(err.code(), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn session_reconciles_with_the_server() {
    let app = TestApp::spawn_with(StubBehavior::Gated).await;
    let api = api_for(&app, "alice");
    let first = api.generate("first", SKETCH.to_vec(), "image/png").await.unwrap();
    let second = api.generate("second", SKETCH.to_vec(), "image/png").await.unwrap();

    let session = Session::new(api);
    session.refresh().await.unwrap();
    assert_eq!(session.view().len(), 2);

    session.toggle_save(first).await.unwrap();
    session.delete(second).await.unwrap();
    assert_eq!(session.saved_view().len(), 1);
    assert_eq!(session.view().len(), 1);

    session.refresh().await.unwrap();
    assert!(session.is_reconciled());
    let view = session.view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, first);
    assert!(view[0].is_saved);

    assert!(session.delete(second).await.is_err());
    assert_eq!(session.view().len(), 1);
}
