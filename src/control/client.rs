//! 动作网关：向飞行器控制端发送命名动作并取回结构化结果
//!
//! 同步请求/响应语义：一次调用可能持续整个机动过程；不可达或非 200 即 GatewayError（单步致命）。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::GatewayError;

use super::types::{ActionResult, ControlRequest, Pose, PositionView};

/// 动作网关 trait；便捷方法都基于 execute
#[async_trait]
pub trait ActionGateway: Send + Sync {
    async fn execute(&self, action_name: &str, params: Value) -> Result<ActionResult, GatewayError>;

    /// 拍一帧，返回图像路径
    async fn get_image(&self) -> Result<PathBuf, GatewayError> {
        match self.execute("get_image", json!({})).await? {
            ActionResult::Image(path) => Ok(path),
            _ => Err(GatewayError::MissingField("image_path")),
        }
    }

    async fn get_state(&self) -> Result<PositionView, GatewayError> {
        match self.execute("get_position_and_view", json!({})).await? {
            ActionResult::State(state) => Ok(state),
            _ => Err(GatewayError::MissingField("view")),
        }
    }

    async fn get_segmentation(&self) -> Result<PathBuf, GatewayError> {
        match self.execute("get_segmentation", json!({})).await? {
            ActionResult::Mask(path) => Ok(path),
            _ => Err(GatewayError::MissingField("seg_mask")),
        }
    }

    async fn set_pose(&self, pose: &Pose) -> Result<(), GatewayError> {
        let params = serde_json::to_value(pose).map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.execute("set_pose", params).await.map(|_| ())
    }
}

/// HTTP 实现：`POST {base_url}/control`
pub struct HttpActionGateway {
    client: Client,
    endpoint: String,
}

impl HttpActionGateway {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/control", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ActionGateway for HttpActionGateway {
    async fn execute(&self, action_name: &str, params: Value) -> Result<ActionResult, GatewayError> {
        let body = ControlRequest {
            action_name: action_name.to_string(),
            action_params: params,
        };
        tracing::debug!(action = action_name, params = %body.action_params, "Control request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Failed to control vehicle: {} {}", status, body);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        ActionResult::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_post_control_and_decode() {
        let app = Router::new().route(
            "/control",
            post(|Json(req): Json<ControlRequest>| async move {
                match req.action_name.as_str() {
                    "get_image" => Json(json!({"image_path": "cache/images/a.png"})),
                    "get_position_and_view" => Json(json!({"x": 3, "y": 4, "z": -5, "view": "downward-looking"})),
                    _ => Json(json!({"status": "success", "echo": req.action_params})),
                }
            }),
        );
        let base = serve(app).await;
        let gateway = HttpActionGateway::new(&base, 5).unwrap();

        assert_eq!(gateway.get_image().await.unwrap(), PathBuf::from("cache/images/a.png"));
        let state = gateway.get_state().await.unwrap();
        assert_eq!(state.view, "downward-looking");
        assert_eq!(gateway.execute("move_forward", json!({})).await.unwrap(), ActionResult::Done);
        gateway.set_pose(&Pose::new([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0])).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_200_is_error() {
        let app = Router::new().route(
            "/control",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;
        let gateway = HttpActionGateway::new(&base, 5).unwrap();
        let err = gateway.execute("land", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable() {
        let gateway = HttpActionGateway::new("http://127.0.0.1:1", 2).unwrap();
        let err = gateway.get_image().await.unwrap_err();
        assert!(matches!(err, GatewayError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_missing_field() {
        let app = Router::new().route("/control", post(|| async { Json(json!({"status": "success"})) }));
        let base = serve(app).await;
        let gateway = HttpActionGateway::new(&base, 5).unwrap();
        assert_eq!(
            gateway.get_segmentation().await.unwrap_err(),
            GatewayError::MissingField("seg_mask")
        );
    }
}
