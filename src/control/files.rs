//! 静态帧服务：按文件名取回已采集的图像，与控制端点解耦

use std::path::PathBuf;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// `GET /file/{name}` 读取 images_dir 下的文件；`GET /test` 健康检查
pub fn router(images_dir: PathBuf) -> Router {
    Router::new()
        .nest_service("/file", ServeDir::new(images_dir))
        .route("/test", get(|| async { Json(json!({ "status": "success" })) }))
        .layer(TraceLayer::new_for_http())
}

/// 在 listener 上运行 axum 服务直到 token 被取消
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP server listening on {}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_frames_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20240101_1.png"), b"\x89PNG\r\n\x1a\n").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, router(dir.path().to_path_buf()), token.clone()));

        let client = reqwest::Client::new();
        let body = client
            .get(format!("http://{}/file/20240101_1.png", addr))
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"\x89PNG\r\n\x1a\n");

        let missing = client
            .get(format!("http://{}/file/nope.png", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        let health: serde_json::Value = client
            .get(format!("http://{}/test", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "success");

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
