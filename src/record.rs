use std::fmt;

use serde::{Deserialize, Serialize};

use crate::request::WeightingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Cell,
    Particle,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Cell => write!(f, "网格单元"),
            RecordKind::Particle => write!(f, "粒子"),
        }
    }
}

/// 记录中存储 (或由存储值直接得到) 的标量字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Rho,
    Vx,
    Vy,
    Vz,
    Pressure,
    Mass,
    Birth,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Rho => "rho",
            Field::Vx => "vx",
            Field::Vy => "vy",
            Field::Vz => "vz",
            Field::Pressure => "p",
            Field::Mass => "mass",
            Field::Birth => "birth",
        }
    }

    /// 该类记录是否提供此字段
    pub fn available_for(self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Cell => !matches!(self, Field::Birth),
            RecordKind::Particle => !matches!(self, Field::Rho | Field::Pressure),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 网格单元与粒子共用的投影接口
///
/// 引擎只针对这个 trait 编写一次；位置与尺寸均为代码单位。
pub trait Record: Sync {
    const KIND: RecordKind;

    /// 中心位置 [x, y, z]
    fn position(&self, box_length: f64) -> [f64; 3];

    /// 立方体边长；粒子为 0
    fn size(&self, box_length: f64) -> f64;

    fn field(&self, field: Field, box_length: f64) -> Option<f64>;

    /// 按权重模式取得该记录的权重
    fn weight(&self, mode: WeightingMode, box_length: f64) -> Option<f64> {
        match mode {
            WeightingMode::Unweighted => Some(1.0),
            WeightingMode::Mass => self.field(Field::Mass, box_length),
            WeightingMode::Volume => match Self::KIND {
                RecordKind::Cell => Some(self.size(box_length).powi(3)),
                RecordKind::Particle => None,
            },
        }
    }
}

/// AMR 网格单元
///
/// `size = box_length / 2^level`，`position = (index - 0.5) * size`，
/// 即整数地址从 1 开始。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub level: u32,
    pub cx: i64,
    pub cy: i64,
    pub cz: i64,
    #[serde(default)]
    pub rho: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
    #[serde(default)]
    pub p: f64,
}

impl CellRecord {
    pub fn new(level: u32, address: [i64; 3]) -> Self {
        Self {
            level,
            cx: address[0],
            cy: address[1],
            cz: address[2],
            ..Default::default()
        }
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_velocity(mut self, v: [f64; 3]) -> Self {
        self.vx = v[0];
        self.vy = v[1];
        self.vz = v[2];
        self
    }

    pub fn with_pressure(mut self, p: f64) -> Self {
        self.p = p;
        self
    }
}

impl Record for CellRecord {
    const KIND: RecordKind = RecordKind::Cell;

    fn position(&self, box_length: f64) -> [f64; 3] {
        let size = self.size(box_length);
        [
            (self.cx as f64 - 0.5) * size,
            (self.cy as f64 - 0.5) * size,
            (self.cz as f64 - 0.5) * size,
        ]
    }

    fn size(&self, box_length: f64) -> f64 {
        box_length / 2f64.powi(self.level as i32)
    }

    fn field(&self, field: Field, box_length: f64) -> Option<f64> {
        match field {
            Field::Rho => Some(self.rho),
            Field::Vx => Some(self.vx),
            Field::Vy => Some(self.vy),
            Field::Vz => Some(self.vz),
            Field::Pressure => Some(self.p),
            Field::Mass => Some(self.rho * self.size(box_length).powi(3)),
            Field::Birth => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub mass: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
    #[serde(default)]
    pub birth: f64,
}

impl ParticleRecord {
    pub fn new(position: [f64; 3], mass: f64) -> Self {
        Self {
            x: position[0],
            y: position[1],
            z: position[2],
            mass,
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, v: [f64; 3]) -> Self {
        self.vx = v[0];
        self.vy = v[1];
        self.vz = v[2];
        self
    }
}

impl Record for ParticleRecord {
    const KIND: RecordKind = RecordKind::Particle;

    fn position(&self, _box_length: f64) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    fn size(&self, _box_length: f64) -> f64 {
        0.0
    }

    fn field(&self, field: Field, _box_length: f64) -> Option<f64> {
        match field {
            Field::Mass => Some(self.mass),
            Field::Vx => Some(self.vx),
            Field::Vy => Some(self.vy),
            Field::Vz => Some(self.vz),
            Field::Birth => Some(self.birth),
            Field::Rho | Field::Pressure => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_geometry_follows_level_and_address() {
        let cell = CellRecord::new(2, [1, 2, 4]);
        assert_eq!(cell.size(1.0), 0.25);
        assert_eq!(cell.position(1.0), [0.125, 0.375, 0.875]);
        assert_eq!(cell.size(48.0), 12.0);
    }

    #[test]
    fn cell_mass_is_density_times_volume() {
        let cell = CellRecord::new(1, [1, 1, 1]).with_rho(8.0);
        assert_eq!(cell.field(Field::Mass, 1.0), Some(1.0));
        assert_eq!(cell.weight(WeightingMode::Mass, 1.0), Some(1.0));
        assert_eq!(cell.weight(WeightingMode::Volume, 1.0), Some(0.125));
        assert_eq!(cell.field(Field::Birth, 1.0), None);
    }

    #[test]
    fn particles_have_no_volume() {
        let part = ParticleRecord::new([0.1, 0.2, 0.3], 2.5);
        assert_eq!(part.size(1.0), 0.0);
        assert_eq!(part.weight(WeightingMode::Mass, 1.0), Some(2.5));
        assert_eq!(part.weight(WeightingMode::Volume, 1.0), None);
        assert_eq!(part.weight(WeightingMode::Unweighted, 1.0), Some(1.0));
        assert!(!Field::Rho.available_for(RecordKind::Particle));
    }
}
