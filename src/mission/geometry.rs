//! 平面几何：任务区域多边形与点包含判定（x, y 为仿真世界坐标）

/// 海域 X1 中的航母甲板
pub const CARRIER_AREA: [[f64; 2]; 13] = [
    [723.0, 2475.0],
    [706.0, 2491.0],
    [647.0, 2441.0],
    [619.0, 2436.0],
    [495.0, 2310.0],
    [474.0, 2267.0],
    [495.0, 2241.0],
    [524.0, 2264.0],
    [541.0, 2235.0],
    [636.0, 2352.0],
    [653.0, 2361.0],
    [672.0, 2378.0],
    [672.0, 2417.0],
];

/// Bruce 港内的红色货船
pub const CARGO_SHIP_AREA: [[f64; 2]; 7] = [
    [-2145.0, 935.0],
    [-2620.0, 935.0],
    [-2680.0, 945.0],
    [-2710.0, 980.0],
    [-2680.0, 1015.0],
    [-2620.0, 1035.0],
    [-2145.0, 1035.0],
];

/// Bruce 港
pub const BRUCE_PORT: [[f64; 2]; 4] = [
    [-2100.0, 810.0],
    [-2100.0, 90.0],
    [-2800.0, 90.0],
    [-2800.0, 810.0],
];

/// 海域 X1 中心
pub const SEA_AREA_X1: (f64, f64) = (1100.0, 2500.0);

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<[f64; 2]>,
}

impl Polygon {
    pub fn new(vertices: impl Into<Vec<[f64; 2]>>) -> Self {
        Self {
            vertices: vertices.into(),
        }
    }

    /// 射线法；边界上的点视为不在内部
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = self.vertices[i];
            let [xj, yj] = self.vertices[j];
            if on_segment(x, y, xi, yi, xj, yj) {
                return false;
            }
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

fn on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    if cross.abs() > f64::EPSILON {
        return false;
    }
    px >= ax.min(bx) && px <= ax.max(bx) && py >= ay.min(by) && py <= ay.max(by)
}

/// 圆形区域（严格在内）
pub fn within_radius(x: f64, y: f64, center: (f64, f64), radius: f64) -> bool {
    let (cx, cy) = center;
    ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() < radius
}
