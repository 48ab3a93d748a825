//! Log and result file handlers.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use labrun_core::RunId;

use crate::artifacts::{resolve_artifact, ArtifactError};
use crate::error::TrackerError;
use crate::http::responses::LogQuery;
use crate::http::ApiError;
use crate::state::AppState;

/// Stream one of the run's log files as plain text.
pub async fn get_run_log(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<RunId>,
    Query(query): Query<LogQuery>,
) -> Result<Response, ApiError> {
    let name = query.stream.file_name();
    let path = run_file(&state, run_id, name).await?;
    stream_file(&path, "text/plain; charset=utf-8").await
}

/// Stream a file from the run's output directory.
pub async fn get_run_result(
    State(state): State<Arc<AppState>>,
    Path((run_id, file_name)): Path<(RunId, String)>,
) -> Result<Response, ApiError> {
    let path = run_file(&state, run_id, &file_name).await?;
    stream_file(&path, content_type_for(&file_name)).await
}

async fn run_file(state: &AppState, run_id: RunId, name: &str) -> Result<PathBuf, ApiError> {
    let run = state
        .store
        .get(run_id)
        .await?
        .ok_or(TrackerError::NotFound(run_id))?;

    let dir = run
        .output_directory
        .ok_or_else(|| ArtifactError::NotFound(name.to_string()))?;

    Ok(resolve_artifact(FsPath::new(&dir), name).await?)
}

async fn stream_file(path: &FsPath, content_type: &'static str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(ArtifactError::Io)?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Content type by file extension.
fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" | "py" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "json" => "application/json",
        "csv" => "text/csv; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "tex" => "application/x-tex",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::artifacts::LogStream;
    use crate::http::handlers::test_support::{body_string, shell_state, wait_terminal};
    use labrun_core::StartRun;

    async fn started(script: &str) -> (Arc<AppState>, tempfile::TempDir, RunId) {
        let (state, root) = shell_state(script);
        let run_id = state
            .launcher
            .start_run(StartRun::new("gpt-4", "exp_a", 3))
            .await
            .unwrap();
        wait_terminal(&state, run_id).await;
        (state, root, run_id)
    }

    fn into_response(result: Result<Response, ApiError>) -> Response {
        match result {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_streams_stdout() {
        let (state, _root, run_id) = started("echo ok").await;

        let response = get_run_log(State(state), Path(run_id), Query(LogQuery::default()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "ok\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_streams_stderr() {
        let (state, _root, run_id) = started("echo oops >&2").await;

        let query = LogQuery {
            stream: LogStream::Stderr,
        };
        let response = get_run_log(State(state), Path(run_id), Query(query))
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "oops\n");
    }

    #[tokio::test]
    async fn test_log_of_unknown_run_is_404() {
        let (state, _root) = shell_state("exit 0");
        let response = into_response(
            get_run_log(State(state), Path(RunId::new(7)), Query(LogQuery::default())).await,
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_result_file_and_traversal() {
        let (state, _root, run_id) =
            started("echo '{\"score\": 1}' > \"$LABRUN_OUTPUT_DIR/final_info.json\"").await;

        let response = get_run_result(
            State(state.clone()),
            Path((run_id, "final_info.json".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, "{\"score\": 1}\n");

        let response = into_response(
            get_run_result(
                State(state.clone()),
                Path((run_id, "../../etc/passwd".to_string())),
            )
            .await,
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = into_response(
            get_run_result(State(state), Path((run_id, "missing.txt".to_string()))).await,
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Send a raw request line to the real router and return the response head.
    async fn raw_get(state: Arc<AppState>, target: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = crate::http::create_router(state);
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            target, addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoded_traversal_through_router_is_rejected() {
        let (state, root, run_id) = started("echo ok").await;
        std::fs::write(root.path().join("secret.txt"), b"api-key-0000").unwrap();

        for name in [
            "..%2F..%2Fetc%2Fpasswd",
            "..%2F..%2Fsecret.txt",
            "%2E%2E%2F%2E%2E%2Fsecret.txt",
            "..",
        ] {
            let target = format!("/runs/{}/results/{}", run_id, name);
            let response = raw_get(state.clone(), &target).await;
            assert!(
                response.starts_with("HTTP/1.1 400"),
                "{} answered {}",
                target,
                response.lines().next().unwrap_or_default()
            );
            assert!(!response.contains("api-key-0000"));
        }

        let response = raw_get(state, &format!("/runs/{}/results/stdout.log", run_id)).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("ok\n"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("report.PDF"), "application/pdf");
        assert_eq!(content_type_for("stdout.log"), "text/plain; charset=utf-8");
        assert_eq!(content_type_for("weights"), "application/octet-stream");
    }
}
