//! End-to-end store behaviour over HTTP: retries, follow-up refreshes and
//! the notifications a user would see.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskmate::models::Severity;
use taskmate::notify::NotificationQueue;
use taskmate::retry::RetryPolicy;
use taskmate::store::{MSG_ADDED, MSG_DELETE_FAILED, MSG_LOAD_FAILED, MSG_RENAMED};
use taskmate::{HttpTaskApi, Priority, TaskId, TaskStore};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> TaskStore<HttpTaskApi> {
    let api = HttpTaskApi::new(&format!("{}/v1/", server.uri()), Duration::from_secs(5)).unwrap();
    TaskStore::new(
        api,
        RetryPolicy::new(3, Duration::from_millis(10)),
        Arc::new(NotificationQueue::default()),
    )
}

fn task_json(id: u64, title: &str) -> serde_json::Value {
    json!({"id": id, "title": title, "completed": false, "priority": "M"})
}

#[tokio::test]
async fn list_recovers_from_transient_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(1, "Buy milk")])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.list_tasks().await.unwrap();

    assert_eq!(store.tasks().len(), 1);
    assert!(store.notifications().visible().is_none());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn list_gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.list_tasks().await.is_err());

    let shown = store.notifications().visible().unwrap();
    assert_eq!(shown.message, MSG_LOAD_FAILED);
    assert_eq!(shown.severity, Severity::Error);
    assert!(store.tasks().is_empty());
}

#[tokio::test]
async fn add_posts_then_refreshes_mirror() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/"))
        .and(body_json(json!({
            "title": "Call mom",
            "priority": "L",
            "due_date": null,
            "description": ""
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(task_json(3, "Call mom")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(3, "Call mom")])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.add_task("Call mom", Priority::Low, None).await.unwrap();

    assert_eq!(store.task(TaskId(3)).unwrap().title, "Call mom");
    assert_eq!(store.notifications().visible().unwrap().message, MSG_ADDED);
}

#[tokio::test]
async fn blank_title_never_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.add_task("   ", Priority::High, None).await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(
        store.notifications().visible().unwrap().severity,
        Severity::Warning
    );
}

#[tokio::test]
async fn failed_delete_leaves_mirror_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(5, "Stretch")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/tasks/5/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.list_tasks().await.unwrap();
    assert!(store.delete_task(TaskId(5)).await.is_err());

    assert!(store.task(TaskId(5)).is_some());
    assert_eq!(store.notifications().visible().unwrap().message, MSG_DELETE_FAILED);
}

#[tokio::test]
async fn saving_an_edit_renames_and_closes_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(8, "Old name")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/tasks/8/"))
        .and(body_json(json!({"title": "New name"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json(8, "New name")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(8, "New name")])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.list_tasks().await.unwrap();
    let task = store.task(TaskId(8)).unwrap();
    store.begin_edit(&task);
    store.set_edit_title("New name");
    store.save_edit().await.unwrap();

    assert!(store.edit_session().editing_id().is_none());
    assert_eq!(store.task(TaskId(8)).unwrap().title, "New name");
    assert_eq!(store.notifications().visible().unwrap().message, MSG_RENAMED);
}
