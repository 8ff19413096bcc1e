//! 控制协议数据类型：请求体、位姿、动作结果

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::GatewayError;

/// `POST /control` 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action_name: String,
    #[serde(default)]
    pub action_params: Value,
}

/// 位置 + 当前相机视角（get_position_and_view）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub view: String,
}

impl PositionView {
    /// 提示与展示用：取整后的 `(x, y, z)`
    pub fn position_text(&self) -> String {
        format!(
            "({}, {}, {})",
            self.x.round() as i64,
            self.y.round() as i64,
            self.z.round() as i64
        )
    }
}

/// 初始位姿：位置（NED）与四元数 (x, y, z, w)；缺省分量由控制端保持当前值
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Option<[f64; 3]>,
    #[serde(rename = "quaternion")]
    pub orientation: Option<[f64; 4]>,
}

impl Pose {
    pub fn new(position: [f64; 3], orientation: [f64; 4]) -> Self {
        Self {
            position: Some(position),
            orientation: Some(orientation),
        }
    }
}

/// 控制端返回的结构化结果
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Image(PathBuf),
    Mask(PathBuf),
    State(PositionView),
    /// 空成功标记（`{"status": "success"}`）
    Done,
}

impl ActionResult {
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        if let Some(path) = value.get("image_path").and_then(Value::as_str) {
            return Ok(Self::Image(PathBuf::from(path)));
        }
        if let Some(path) = value.get("seg_mask").and_then(Value::as_str) {
            return Ok(Self::Mask(PathBuf::from(path)));
        }
        if value.get("view").is_some() {
            let state: PositionView =
                serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
            return Ok(Self::State(state));
        }
        Ok(Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_variants() {
        assert_eq!(
            ActionResult::from_value(json!({"image_path": "cache/images/1.png"})).unwrap(),
            ActionResult::Image(PathBuf::from("cache/images/1.png"))
        );
        assert_eq!(
            ActionResult::from_value(json!({"seg_mask": "m.png"})).unwrap(),
            ActionResult::Mask(PathBuf::from("m.png"))
        );
        assert_eq!(
            ActionResult::from_value(json!({"status": "success"})).unwrap(),
            ActionResult::Done
        );
        let state = ActionResult::from_value(json!({"x": 1, "y": -2, "z": -50, "view": "forward-looking"})).unwrap();
        match state {
            ActionResult::State(s) => assert_eq!(s.position_text(), "(1, -2, -50)"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_broken_state_is_decode_error() {
        let err = ActionResult::from_value(json!({"x": "far", "view": "forward-looking"})).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[test]
    fn test_pose_serializes_quaternion_key() {
        let v = serde_json::to_value(Pose::new([0.0, 0.0, -2.0], [0.0, 0.0, 1.0, 0.0])).unwrap();
        assert_eq!(v["quaternion"], json!([0.0, 0.0, 1.0, 0.0]));
        assert_eq!(serde_json::to_value(Pose::default()).unwrap(), json!({"position": null, "quaternion": null}));
    }
}
