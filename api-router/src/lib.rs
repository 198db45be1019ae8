use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    books::{delete_book, file_info, get_book, reprocess_book, upload_book},
    health::{live, ready},
    jobs::get_job,
    maintenance::cleanup,
    pages::get_page,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

pub use middleware_api_auth::USER_ID_HEADER;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require a caller identity)
    let protected = Router::new()
        .route(
            "/books",
            post(upload_book).layer(DefaultBodyLimit::max(app_state.config.upload_body_limit())),
        )
        .route("/books/{id}", get(get_book).delete(delete_book))
        .route("/books/{id}/file-info", get(file_info))
        .route("/books/{id}/pages/{page}", get(get_page))
        .route("/books/{id}/reprocess", post(reprocess_book))
        .route("/jobs/{job_id}", get(get_job))
        .route("/maintenance/cleanup", post(cleanup))
        .route_layer(from_fn(api_auth));

    public.merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use chrono::Utc;
    use common::{
        storage::{
            db::SurrealDbClient,
            store::ContentStore,
            types::extraction_job::ExtractionJob,
        },
        utils::config::AppConfig,
    };
    use ingestion_pipeline::{test_pdfs, IngestionConfig, IngestionPipeline};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "shelf-test-boundary";

    struct TestApp {
        router: Router,
        state: ApiState,
        _dir: TempDir,
    }

    async fn test_app() -> TestApp {
        test_app_with(AppConfig::default()).await
    }

    async fn test_app_with(config: AppConfig) -> TestApp {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        db.ensure_initialized().await.expect("indexes");
        let dir = TempDir::new().expect("tempdir");
        let state = ApiState::from_parts(
            Arc::new(db),
            config,
            ContentStore::with_root(dir.path().join("store")),
        );
        let router = Router::new()
            .nest("/api/v1", api_routes_v1(&state))
            .with_state(state.clone());

        TestApp {
            router,
            state,
            _dir: dir,
        }
    }

    fn multipart_body(file_name: &str, bytes: &[u8], title: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
        if let Some(title) = title {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(user: &str, file_name: &str, bytes: &[u8], title: Option<&str>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/books")
            .header(USER_ID_HEADER, user)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file_name, bytes, title)))
            .expect("request")
    }

    fn get_request(user: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(USER_ID_HEADER, user)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn run_next_job(state: &ApiState) {
        let pipeline = IngestionPipeline::new(Arc::clone(&state.db), IngestionConfig::default());
        let job = ExtractionJob::claim_next_queued(&state.db, "test-worker", Utc::now())
            .await
            .expect("claim")
            .expect("queued job");
        pipeline.process_job(job).await.expect("extraction");
    }

    #[tokio::test]
    async fn health_checks_are_public() {
        let app = test_app().await;

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_checks_storage_root() {
        let app = test_app().await;

        let not_ready = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(not_ready).await["checks"]["storage"], "fail");

        std::fs::create_dir_all(app.state.store.root()).expect("create root");
        let ready = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_identity() {
        let app = test_app().await;

        let missing = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/jobs/anything")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let traversal = app
            .router
            .oneshot(get_request("..", "/api/v1/jobs/anything"))
            .await
            .expect("response");
        assert_eq!(traversal.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upload_then_extract_uses_file_name_for_untitled_pdf() {
        let app = test_app().await;
        let pdf = test_pdfs::pdf_with_pages(&[&[], &[], &[]]);

        let response = app
            .router
            .clone()
            .oneshot(upload_request("reader", "report.pdf", &pdf, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let receipt = json_body(response).await;
        assert_eq!(receipt["file_name"], "report.pdf");
        assert_eq!(receipt["deduplicated"], false);
        let job_id = receipt["job_id"].as_str().expect("job id").to_string();
        let book_id = receipt["book_id"].as_str().expect("book id").to_string();
        assert_eq!(receipt["status_url"], format!("/api/v1/jobs/{job_id}"));

        let pending = app
            .router
            .clone()
            .oneshot(get_request("reader", &format!("/api/v1/jobs/{job_id}")))
            .await
            .expect("response");
        assert_eq!(json_body(pending).await["status"], "processing");

        run_next_job(&app.state).await;

        let job = app
            .router
            .clone()
            .oneshot(get_request("reader", &format!("/api/v1/jobs/{job_id}")))
            .await
            .expect("response");
        let job = json_body(job).await;
        assert_eq!(job["status"], "completed");
        assert_eq!(job["progress"], 100);

        let book = app
            .router
            .oneshot(get_request("reader", &format!("/api/v1/books/{book_id}")))
            .await
            .expect("response");
        assert_eq!(book.status(), StatusCode::OK);
        let book = json_body(book).await;
        assert_eq!(book["title"], "report");
        assert_eq!(book["total_pages"], 3);
        assert_eq!(book["status"], "completed");
    }

    #[tokio::test]
    async fn encrypted_upload_is_rejected_with_reason() {
        let app = test_app().await;

        let response = app
            .router
            .oneshot(upload_request(
                "reader",
                "secret.pdf",
                &test_pdfs::encrypted_pdf(),
                None,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "PDF is encrypted");
        assert_eq!(body["code"], "encrypted");
    }

    #[tokio::test]
    async fn title_field_overrides_embedded_metadata() {
        let app = test_app().await;
        let pdf = test_pdfs::build_pdf(
            &[&["Body text"]],
            Some(test_pdfs::info(&[("Title", "Embedded")])),
        );

        let response = app
            .router
            .clone()
            .oneshot(upload_request("reader", "book.pdf", &pdf, Some("Chosen")))
            .await
            .expect("response");
        let receipt = json_body(response).await;
        let book_id = receipt["book_id"].as_str().expect("book id").to_string();

        run_next_job(&app.state).await;

        let book = app
            .router
            .oneshot(get_request("reader", &format!("/api/v1/books/{book_id}")))
            .await
            .expect("response");
        let book = json_body(book).await;
        assert_eq!(book["title"], "Chosen");
        assert_eq!(book["metadata"]["title"], "Embedded");
    }

    #[tokio::test]
    async fn page_window_reports_boundaries_and_invalid_pages() {
        let app = test_app().await;
        let pdf = test_pdfs::pdf_with_pages(&[&["First A", "First B"], &["Second A"]]);
        let response = app
            .router
            .clone()
            .oneshot(upload_request("reader", "two.pdf", &pdf, None))
            .await
            .expect("response");
        let receipt = json_body(response).await;
        let book_id = receipt["book_id"].as_str().expect("book id").to_string();

        let last = app
            .router
            .clone()
            .oneshot(get_request(
                "reader",
                &format!("/api/v1/books/{book_id}/pages/2?context_lines=1"),
            ))
            .await
            .expect("response");
        assert_eq!(last.status(), StatusCode::OK);
        let last = json_body(last).await;
        assert_eq!(last["current_page_text"], "Second A");
        assert_eq!(last["previous_context"], "First B");
        assert_eq!(last["has_next"], false);
        assert_eq!(last["next_context"], "");
        assert_eq!(last["total_pages"], 2);

        let invalid = app
            .router
            .oneshot(get_request(
                "reader",
                &format!("/api/v1/books/{book_id}/pages/3"),
            ))
            .await
            .expect("response");
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        let invalid = json_body(invalid).await;
        assert_eq!(invalid["text"], "");
        assert!(invalid["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn books_are_private_to_their_owner() {
        let app = test_app().await;
        let pdf = test_pdfs::pdf_with_pages(&[&["Private"]]);
        let response = app
            .router
            .clone()
            .oneshot(upload_request("reader", "mine.pdf", &pdf, None))
            .await
            .expect("response");
        let receipt = json_body(response).await;
        let book_id = receipt["book_id"].as_str().expect("book id").to_string();

        for uri in [
            format!("/api/v1/books/{book_id}"),
            format!("/api/v1/books/{book_id}/file-info"),
            format!("/api/v1/books/{book_id}/pages/1"),
        ] {
            let response = app
                .router
                .clone()
                .oneshot(get_request("someone-else", &uri))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn file_info_describes_the_stored_content() {
        let app = test_app().await;
        let pdf = test_pdfs::pdf_with_pages(&[&["Described"]]);
        let response = app
            .router
            .clone()
            .oneshot(upload_request("reader", "info.pdf", &pdf, None))
            .await
            .expect("response");
        let receipt = json_body(response).await;
        let book_id = receipt["book_id"].as_str().expect("book id").to_string();

        let info = app
            .router
            .oneshot(get_request(
                "reader",
                &format!("/api/v1/books/{book_id}/file-info"),
            ))
            .await
            .expect("response");
        assert_eq!(info.status(), StatusCode::OK);
        let info = json_body(info).await;
        assert_eq!(info["file"]["sha256"], receipt["sha256"]);
        assert_eq!(info["file"]["size_bytes"], pdf.len());
        assert_eq!(info["file_name"], "info.pdf");
    }

    #[tokio::test]
    async fn deleting_a_book_removes_its_file() {
        let app = test_app().await;
        let pdf = test_pdfs::pdf_with_pages(&[&["Gone soon"]]);
        let response = app
            .router
            .clone()
            .oneshot(upload_request("reader", "gone.pdf", &pdf, None))
            .await
            .expect("response");
        let receipt = json_body(response).await;
        let book_id = receipt["book_id"].as_str().expect("book id").to_string();
        let stored_path = receipt["stored_path"].as_str().expect("path").to_string();

        let deleted = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/books/{book_id}"))
                    .header(USER_ID_HEADER, "reader")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert!(!std::path::Path::new(&stored_path).exists());

        let missing = app
            .router
            .oneshot(get_request("reader", &format!("/api/v1/books/{book_id}")))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_cleanup_reports_counts() {
        let app = test_app().await;

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/maintenance/cleanup")
                    .header(USER_ID_HEADER, "reader")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["temp_files_removed"], 0);
        assert_eq!(report["jobs_removed"], 0);
    }

    #[tokio::test]
    async fn manual_cleanup_is_scoped_to_the_caller() {
        let app = test_app_with(AppConfig {
            temp_retention_secs: 0,
            ..AppConfig::default()
        })
        .await;
        for user_id in ["reader", "other"] {
            let user_dir = app.state.store.user_dir(user_id).expect("user dir");
            std::fs::create_dir_all(&user_dir).expect("mkdir");
            std::fs::write(user_dir.join("upload-orphan.tmp"), b"partial").expect("write temp");
        }

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/maintenance/cleanup")
                    .header(USER_ID_HEADER, "reader")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["temp_files_removed"], 1);
        let reader_dir = app.state.store.user_dir("reader").expect("user dir");
        let other_dir = app.state.store.user_dir("other").expect("user dir");
        assert!(!reader_dir.join("upload-orphan.tmp").exists());
        assert!(other_dir.join("upload-orphan.tmp").exists());
    }
}
