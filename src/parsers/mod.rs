mod json;

pub use json::{GzipJsonParser, JsonParser};

use serde::{Deserialize, Serialize};

use crate::error::InvalidRequestError;
use crate::map_result::MapResult;
use crate::projection::project;
use crate::record::{CellRecord, ParticleRecord, RecordKind};
use crate::request::ProjectionRequest;
use crate::units::SimulationInfo;
use crate::utils::parser::{DatasetParser, ParseError};

/// 获取所有可用的解析器
pub fn get_all_parsers() -> Vec<Box<dyn DatasetParser>> {
    vec![Box::new(JsonParser::new()), Box::new(GzipJsonParser::new())]
}

/// 读取器输出：同一文件里只有一种记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dataset {
    Cells {
        info: SimulationInfo,
        cells: Vec<CellRecord>,
    },
    Particles {
        info: SimulationInfo,
        particles: Vec<ParticleRecord>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub kind: RecordKind,
    pub info: SimulationInfo,
    pub records: usize,
}

impl Dataset {
    pub fn info(&self) -> &SimulationInfo {
        match self {
            Dataset::Cells { info, .. } | Dataset::Particles { info, .. } => info,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Dataset::Cells { .. } => RecordKind::Cell,
            Dataset::Particles { .. } => RecordKind::Particle,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dataset::Cells { cells, .. } => cells.len(),
            Dataset::Particles { particles, .. } => particles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn describe(&self) -> DatasetInfo {
        DatasetInfo {
            kind: self.kind(),
            info: self.info().clone(),
            records: self.len(),
        }
    }

    /// 检查层级与地址；`levelmax` 为 0 时不限制层级
    pub fn validate(&self) -> Result<(), ParseError> {
        let info = self.info();
        if !(info.box_length.is_finite() && info.box_length > 0.0) {
            return Err(ParseError::InvalidBoxLength(info.box_length));
        }
        match self {
            Dataset::Cells { cells, .. } => {
                for (index, cell) in cells.iter().enumerate() {
                    let bounded = info.levelmax > 0;
                    if cell.level > 62
                        || (bounded && !(info.levelmin..=info.levelmax).contains(&cell.level))
                    {
                        return Err(ParseError::InvalidLevel {
                            index,
                            level: cell.level,
                            levelmin: info.levelmin,
                            levelmax: info.levelmax,
                        });
                    }
                    let side = 1i64 << cell.level;
                    let address = [cell.cx, cell.cy, cell.cz];
                    if address.iter().any(|&c| c < 1 || c > side) {
                        return Err(ParseError::InvalidAddress {
                            index,
                            level: cell.level,
                            address,
                        });
                    }
                }
            }
            Dataset::Particles { particles, .. } => {
                if let Some(index) = particles
                    .iter()
                    .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
                {
                    return Err(ParseError::NonFinitePosition { index });
                }
            }
        }
        Ok(())
    }

    /// 按记录种类分派到 [`project`]
    pub fn project(&self, request: &ProjectionRequest) -> Result<MapResult, InvalidRequestError> {
        match self {
            Dataset::Cells { cells, .. } => project(cells, request),
            Dataset::Particles { particles, .. } => project(particles, request),
        }
    }
}
