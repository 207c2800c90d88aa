// src/remote_tests.rs

#[cfg(test)]
mod tests {
    use crate::model::{ActivityType, Month};
    use crate::remote::*;
    use crate::seed;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;
    use url::Url;

    #[derive(Clone, Default)]
    struct Fake {
        posted: Arc<Mutex<Vec<Value>>>,
        initial: Arc<Mutex<Option<Value>>>,
    }

    async fn fake_get(
        State(fake): State<Fake>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        if params.get("action").map(String::as_str) != Some("getInitialData") {
            return (StatusCode::BAD_REQUEST, "unknown action".to_string());
        }
        match fake.initial.lock().await.clone() {
            Some(v) => (StatusCode::OK, v.to_string()),
            // Apps Script serves an HTML error page when the script throws.
            None => (StatusCode::OK, "<html><body>Erro</body></html>".to_string()),
        }
    }

    async fn fake_post(State(fake): State<Fake>, Json(body): Json<Value>) -> Json<Value> {
        fake.posted.lock().await.push(body);
        Json(json!({ "status": "success" }))
    }

    async fn start_fake(fake: Fake) -> Url {
        let app = Router::new()
            .route("/exec", get(fake_get).post(fake_post))
            .with_state(fake);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}/exec", addr)).unwrap()
    }

    fn client(url: Url) -> AppsScriptClient {
        AppsScriptClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_write_wire_format() {
        let write = RemoteWrite::DeleteTeacher { id: "3".to_string() };
        assert_eq!(
            serde_json::to_value(&write).unwrap(),
            json!({ "action": "deleteTeacher", "payload": { "id": "3" } })
        );

        let write = RemoteWrite::SaveActivityType(ActivityType {
            id: "17".to_string(),
            name: "VISITA".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&write).unwrap(),
            json!({ "action": "saveActivityType", "payload": { "id": "17", "name": "VISITA" } })
        );
        assert_eq!(write.action(), "saveActivityType");
    }

    #[tokio::test]
    async fn test_fetch_initial_data() {
        let fake = Fake::default();
        *fake.initial.lock().await = Some(json!({
            "teachers": [{ "id": 5, "name": "ANA", "masp": "123-4", "role": "TEACHER", "chRegimeBasico": "8" }],
            "reports": [{ "teacherId": "5", "month": "ABRIL", "year": 2025, "weeks": "[]" }],
            "activityTypes": []
        }));
        let url = start_fake(fake).await;

        let data = client(url).fetch_initial_data().await.unwrap();
        assert_eq!(data.teachers[0].id, "5");
        assert_eq!(data.teachers[0].ch_regime_basico, Some(8));
        assert_eq!(data.reports[0].month, Month::Abril);
        assert!(data.activity_types.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_answer_is_unavailable() {
        let url = start_fake(Fake::default()).await;
        let err = client(url).fetch_initial_data().await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let fake = Fake::default();
        let url = start_fake(fake).await;
        let wrong_path = url.join("/missing").unwrap();
        let err = client(wrong_path).fetch_initial_data().await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status, .. } if status.as_u16() == 404));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Bind and drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{}/exec", addr)).unwrap();
        let err = client(url).fetch_initial_data().await.unwrap_err();
        assert!(matches!(err, RemoteError::Request(_)));
    }

    #[tokio::test]
    async fn test_spawned_write_reaches_endpoint() {
        let fake = Fake::default();
        let url = start_fake(fake.clone()).await;
        let remote: Arc<dyn RemoteStore> = Arc::new(client(url));

        let teacher = seed::teachers().remove(2);
        spawn_write(remote, RemoteWrite::SaveTeacher(teacher))
            .await
            .unwrap();

        let posted = fake.posted.lock().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["action"], "saveTeacher");
        assert_eq!(posted[0]["payload"]["name"], "SARA DE SOUZA");
        assert_eq!(posted[0]["payload"]["chExtraClasse"], "04:00");
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{}/exec", addr)).unwrap();
        let remote: Arc<dyn RemoteStore> = Arc::new(client(url));

        // The task finishes normally; the failure is only logged.
        let handle = spawn_write(remote, RemoteWrite::DeleteActivityType { id: "1".to_string() });
        assert!(handle.await.is_ok());
    }
}
