use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// 投影方向 (视线轴)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    X,
    Y,
    #[default]
    Z,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::X, Direction::Y, Direction::Z];

    /// (u, v, w)：投影平面上的两个轴下标与视线轴下标
    pub fn axes(self) -> (usize, usize, usize) {
        match self {
            Direction::X => (1, 2, 0),
            Direction::Y => (0, 2, 1),
            Direction::Z => (0, 1, 2),
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::X => 0,
            Direction::Y => 1,
            Direction::Z => 2,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::X => f.write_str("x"),
            Direction::Y => f.write_str("y"),
            Direction::Z => f.write_str("z"),
        }
    }
}

/// 记录在投影平面上的足迹，绝对代码单位
///
/// 粒子的 `half_width` 为 0，即一个点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub u: f64,
    pub v: f64,
    /// 视线方向坐标，用于范围裁剪
    pub w: f64,
    pub half_width: f64,
}

impl Footprint {
    pub fn u_interval(&self) -> (f64, f64) {
        (self.u - self.half_width, self.u + self.half_width)
    }

    pub fn v_interval(&self) -> (f64, f64) {
        (self.v - self.half_width, self.v + self.half_width)
    }
}

/// 相对中心、按单位缩放后的物理区间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalFootprint {
    pub u: (f64, f64),
    pub v: (f64, f64),
    pub w: f64,
}

/// 把记录映射到投影平面
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    direction: Direction,
    box_length: f64,
    center: [f64; 3],
    scale: f64,
}

impl CoordinateMapper {
    /// `center` 为代码单位；`scale` 为代码单位到范围单位的系数
    pub fn new(direction: Direction, box_length: f64, center: [f64; 3], scale: f64) -> Self {
        Self {
            direction,
            box_length,
            center,
            scale,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn map<R: Record>(&self, record: &R) -> Footprint {
        let (iu, iv, iw) = self.direction.axes();
        let pos = record.position(self.box_length);
        Footprint {
            u: pos[iu],
            v: pos[iv],
            w: pos[iw],
            half_width: 0.5 * record.size(self.box_length),
        }
    }

    /// 绝对代码坐标 -> 相对中心的物理坐标
    pub fn relative(&self, axis: usize, code: f64) -> f64 {
        (code - self.center[axis]) * self.scale
    }

    pub fn physical(&self, footprint: &Footprint) -> PhysicalFootprint {
        let (iu, iv, iw) = self.direction.axes();
        let (u0, u1) = footprint.u_interval();
        let (v0, v1) = footprint.v_interval();
        PhysicalFootprint {
            u: (self.relative(iu, u0), self.relative(iu, u1)),
            v: (self.relative(iv, v0), self.relative(iv, v1)),
            w: self.relative(iw, footprint.w),
        }
    }
}
