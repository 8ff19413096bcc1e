//! 内置运动学仿真器：`POST /control` 的本地替身
//!
//! 只维护位置、偏航、相机视角三项状态，不做动力学与渲染；帧与分割掩码以灰度 PNG 写入缓存目录。
//! 下视且位于目标区域上方时掩码中心为目标；前视且目标在前方一定距离内时掩码出现一小块目标。

use std::f64::consts::{FRAC_PI_4, PI};
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::{AppConfig, SimSection, BOTTOM_VIEW, FRONT_VIEW};
use crate::mission::geometry::Polygon;
use crate::mission::mask::SegMask;

use super::types::ControlRequest;

const FRAME_WIDTH: usize = 64;
const FRAME_HEIGHT: usize = 48;
/// 前视能「看到」目标的距离范围（米）；太近时目标在机身正下方，前视看不到
const FRONT_SIGHT_RANGE: f64 = 600.0;
const FRONT_BLIND_RANGE: f64 = 30.0;

/// 仿真飞行器
#[derive(Debug)]
pub struct VehicleSim {
    settings: SimSection,
    target: Polygon,
    default_view: String,
    images_dir: PathBuf,
    seg_dir: PathBuf,
    position: [f64; 3],
    /// 弧度，0 为 +x 方向
    yaw: f64,
    view: String,
    landed: bool,
    frames: u64,
}

impl VehicleSim {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            settings: cfg.sim.clone(),
            target: Polygon::new(cfg.sim.target_area.clone()),
            default_view: cfg.app.default_view.clone(),
            images_dir: cfg.app.images_dir(),
            seg_dir: cfg.app.segmentation_dir(),
            position: cfg.sim.init_position,
            yaw: 0.0,
            view: cfg.app.default_view.clone(),
            landed: false,
            frames: 0,
        }
    }

    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn is_landed(&self) -> bool {
        self.landed
    }

    /// 执行一个动作；参数缺失时返回 Err（HTTP 400）
    pub async fn exec(&mut self, req: &ControlRequest) -> Result<Value, String> {
        let params = &req.action_params;
        let name = req.action_name.as_str();
        tracing::info!("Sim: exec action {} with params {}", name, params);

        match name {
            "turn_left" => self.yaw -= self.settings.turn_degrees.to_radians(),
            "turn_right" => self.yaw += self.settings.turn_degrees.to_radians(),
            "move_up" => self.climb(-self.settings.step_dist),
            "move_down" => self.climb(self.settings.step_dist),
            "move_forward" => self.translate(0.0),
            "move_backward" => self.translate(PI),
            "move_left" => self.translate(-PI / 2.0),
            "move_right" => self.translate(PI / 2.0),
            "move_upleft" => self.translate(-FRAC_PI_4),
            "move_upright" => self.translate(FRAC_PI_4),
            "move_downleft" => self.translate(-3.0 * FRAC_PI_4),
            "move_downright" => self.translate(3.0 * FRAC_PI_4),
            "fly_to" => {
                let x = number(params, "x")?;
                let y = number(params, "y")?;
                let z = params
                    .get("z")
                    .and_then(Value::as_f64)
                    .unwrap_or(self.settings.init_position[2]);
                self.position = [x, y, z];
                self.landed = false;
            }
            "set_position" => {
                self.position = [number(params, "x")?, number(params, "y")?, number(params, "z")?];
                self.yaw = 0.0;
                self.landed = false;
            }
            "set_pose" => {
                if let Some(p) = triple(params.get("position")) {
                    self.position = p;
                }
                if let Some(q) = params.get("quaternion").and_then(Value::as_array) {
                    let q: Vec<f64> = q.iter().filter_map(Value::as_f64).collect();
                    if let [x, y, z, w] = q[..] {
                        self.yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
                    }
                }
                self.landed = false;
            }
            "switch_view" => {
                self.view = if self.view == FRONT_VIEW {
                    BOTTOM_VIEW.to_string()
                } else {
                    FRONT_VIEW.to_string()
                };
            }
            "land" => {
                self.position[2] = 0.0;
                self.landed = true;
            }
            "hover" => {}
            "reset" => {
                self.position = self.settings.init_position;
                self.yaw = 0.0;
                self.view = self.default_view.clone();
                self.landed = false;
            }
            "get_image" => {
                let path = self.write_frame("images").await?;
                return Ok(json!({ "image_path": path }));
            }
            "get_segmentation" => {
                let path = self.write_frame("segmentation").await?;
                return Ok(json!({ "seg_mask": path }));
            }
            "get_position_and_view" => {
                return Ok(json!({
                    "x": self.position[0] as i64,
                    "y": self.position[1] as i64,
                    "z": self.position[2] as i64,
                    "view": self.view,
                }));
            }
            other => tracing::warn!("Sim: action {} not supported", other),
        }
        Ok(json!({ "status": "success" }))
    }

    fn climb(&mut self, dz: f64) {
        self.position[2] += dz;
        self.landed = false;
    }

    /// 相对机头方向 offset 弧度平移一步
    fn translate(&mut self, offset: f64) {
        let heading = self.yaw + offset;
        self.position[0] += self.settings.step_dist * heading.cos();
        self.position[1] += self.settings.step_dist * heading.sin();
        self.landed = false;
    }

    /// 当前视角下的目标掩码
    pub fn render_mask(&self) -> SegMask {
        let mut mask = SegMask::new(FRAME_WIDTH, FRAME_HEIGHT);
        let [x, y, _] = self.position;

        if self.view == BOTTOM_VIEW {
            if self.target.contains(x, y) {
                fill(&mut mask, FRAME_WIDTH / 2, FRAME_HEIGHT / 2, 12, 12);
            }
            return mask;
        }

        // 前视：目标质心在视场（±45°）与射程内时，按方位角画一小块
        let (tx, ty) = self.target_centroid();
        let distance = ((tx - x).powi(2) + (ty - y).powi(2)).sqrt();
        let bearing = normalize((ty - y).atan2(tx - x) - self.yaw);
        if distance > FRONT_BLIND_RANGE && distance < FRONT_SIGHT_RANGE && bearing.abs() < FRAC_PI_4 {
            let cx = (FRAME_WIDTH as f64 / 2.0 * (1.0 + bearing / FRAC_PI_4)) as usize;
            fill(&mut mask, cx, FRAME_HEIGHT / 2, 5, 3);
        }
        mask
    }

    fn target_centroid(&self) -> (f64, f64) {
        let area = &self.settings.target_area;
        if area.is_empty() {
            return (f64::MAX, f64::MAX);
        }
        let n = area.len() as f64;
        let (sx, sy) = area.iter().fold((0.0, 0.0), |(sx, sy), [x, y]| (sx + x, sy + y));
        (sx / n, sy / n)
    }

    async fn write_frame(&mut self, kind: &str) -> Result<String, String> {
        let mut image = self.render_mask();
        let dir = if kind == "images" {
            // 帧图：背景灰度 + 目标高亮
            for p in image.pixels.iter_mut() {
                *p = if *p == 0 { 80 } else { 230 };
            }
            &self.images_dir
        } else {
            &self.seg_dir
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("create {}: {}", dir.display(), e))?;
        self.frames += 1;
        let name = format!("{}_{}.png", chrono::Local::now().format("%Y%m%d%H%M%S"), self.frames);
        let path = dir.join(name);
        let bytes = image.encode_png().map_err(|e| e.to_string())?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| format!("write {}: {}", path.display(), e))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

fn number(params: &Value, key: &str) -> Result<f64, String> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("missing numeric param `{}`", key))
}

fn triple(value: Option<&Value>) -> Option<[f64; 3]> {
    let items: Vec<f64> = value?.as_array()?.iter().filter_map(Value::as_f64).collect();
    match items[..] {
        [x, y, z] => Some([x, y, z]),
        _ => None,
    }
}

fn normalize(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

fn fill(mask: &mut SegMask, cx: usize, cy: usize, half_w: usize, half_h: usize) {
    for y in cy.saturating_sub(half_h)..cy + half_h {
        for x in cx.saturating_sub(half_w)..cx + half_w {
            mask.set(x, y, 255);
        }
    }
}

async fn control(
    State(sim): State<Arc<Mutex<VehicleSim>>>,
    Json(req): Json<ControlRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut sim = sim.lock().await;
    sim.exec(&req)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

/// 控制端路由：`POST /control`、`GET /test`
pub fn router(sim: Arc<Mutex<VehicleSim>>) -> Router {
    Router::new()
        .route("/control", post(control))
        .route("/test", get(|| async { Json(json!({ "status": "success" })) }))
        .with_state(sim)
}
