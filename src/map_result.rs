//! 投影结果：只在所有工作线程汇合后由调度线程写一次，之后只读

use std::collections::BTreeMap;
use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{EmptyResultWarning, VariableError};
use crate::performance::PerformanceRecord;
use crate::projection::accumulator::{Reduction, WeightedAccumulator};
use crate::projection::binner::PixelGrid;
use crate::projection::coords::Direction;
use crate::variable::Variable;

/// 图的空间范围，单位为请求的 range_unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapExtent {
    /// 横轴绝对范围
    pub x: (f64, f64),
    /// 纵轴绝对范围
    pub y: (f64, f64),
    /// 相对 center 的横轴范围
    pub x_centered: (f64, f64),
    pub y_centered: (f64, f64),
}

impl MapExtent {
    pub(crate) fn of_grid(grid: &PixelGrid, direction: Direction, center: [f64; 3], scale: f64) -> Self {
        let (iu, iv, _) = direction.axes();
        let (u0, u1) = grid.u_extent();
        let (v0, v1) = grid.v_extent();
        Self {
            x: (u0 * scale, u1 * scale),
            y: (v0 * scale, v1 * scale),
            x_centered: ((u0 - center[iu]) * scale, (u1 - center[iu]) * scale),
            y_centered: ((v0 - center[iv]) * scale, (v1 - center[iv]) * scale),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        (self.x.1 - self.x.0) / (self.y.1 - self.y.0)
    }
}

/// 单个变量的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    /// 行优先 (x 最快)，已乘单位系数；无贡献像素为 NaN
    pub data: Vec<f64>,
    pub unit: String,
    pub unit_factor: f64,
    pub reduction: Reduction,
    /// 原始累加量 (代码单位)，供重映射精确重算
    pub moments: Option<WeightedAccumulator>,
}

/// 重映射得到的粗分辨率图
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseMap {
    pub depth: u32,
    pub grid: PixelGrid,
    pub extent: MapExtent,
    pub maps: BTreeMap<Variable, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapResult {
    pub(crate) run_id: Uuid,
    pub(crate) direction: Direction,
    pub(crate) grid: PixelGrid,
    pub(crate) box_length: f64,
    pub(crate) center: [f64; 3],
    pub(crate) range_unit: String,
    pub(crate) range_scale: f64,
    pub(crate) extent: MapExtent,
    pub(crate) layers: BTreeMap<Variable, MapLayer>,
    pub(crate) errors: BTreeMap<Variable, VariableError>,
    pub(crate) warnings: Vec<EmptyResultWarning>,
    pub(crate) timings: Vec<PerformanceRecord>,
    pub(crate) peak_concurrency: usize,
    pub(crate) coarse: BTreeMap<u32, CoarseMap>,
}

impl MapResult {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.grid.nx, self.grid.ny)
    }

    /// 像素边长，range_unit
    pub fn pixel_size(&self) -> f64 {
        self.grid.pixel_size * self.range_scale
    }

    /// 像素边长为 `box_length / 2^L` 时的 L；只有这样的图可以重映射
    pub fn effective_depth(&self) -> Option<u32> {
        self.grid.depth
    }

    pub fn box_length(&self) -> f64 {
        self.box_length
    }

    /// 中心，代码单位
    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    pub fn range_unit(&self) -> &str {
        &self.range_unit
    }

    pub fn extent(&self) -> &MapExtent {
        &self.extent
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.extent.aspect_ratio()
    }

    /// 成功计算的变量，按名称顺序
    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.layers.keys().copied()
    }

    pub fn layer(&self, variable: Variable) -> Option<&MapLayer> {
        self.layers.get(&variable)
    }

    pub fn map(&self, variable: Variable) -> Option<&[f64]> {
        self.layers.get(&variable).map(|l| l.data.as_slice())
    }

    pub fn unit(&self, variable: Variable) -> Option<&str> {
        self.layers.get(&variable).map(|l| l.unit.as_str())
    }

    /// 逐像素权重和 (仅在保留了累加量时可用)
    pub fn weights(&self, variable: Variable) -> Option<&[f64]> {
        self.layers
            .get(&variable)
            .and_then(|l| l.moments.as_ref())
            .map(|m| m.weight_sum())
    }

    /// 像素 (i, j) 的值
    pub fn value(&self, variable: Variable, i: usize, j: usize) -> Option<f64> {
        if i >= self.grid.nx || j >= self.grid.ny {
            return None;
        }
        self.map(variable).map(|m| m[self.grid.index(i, j)])
    }

    pub fn error(&self, variable: Variable) -> Option<&VariableError> {
        self.errors.get(&variable)
    }

    pub fn errors(&self) -> &BTreeMap<Variable, VariableError> {
        &self.errors
    }

    /// 所有请求的变量都计算成功
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[EmptyResultWarning] {
        &self.warnings
    }

    pub fn timings(&self) -> &[PerformanceRecord] {
        &self.timings
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_concurrency
    }

    pub fn coarse(&self, depth: u32) -> Option<&CoarseMap> {
        self.coarse.get(&depth)
    }

    pub fn coarse_depths(&self) -> impl Iterator<Item = u32> + '_ {
        self.coarse.keys().copied()
    }

    /// `depth` 为 None 时取原分辨率
    pub fn map_at(&self, variable: Variable, depth: Option<u32>) -> Option<&[f64]> {
        match depth {
            None => self.map(variable),
            Some(d) if Some(d) == self.effective_depth() => self.map(variable),
            Some(d) => self
                .coarse
                .get(&d)
                .and_then(|c| c.maps.get(&variable))
                .map(Vec::as_slice),
        }
    }

    /// 小端 f64 编码，x 最快
    pub fn map_le_bytes(&self, variable: Variable, depth: Option<u32>) -> io::Result<Option<Vec<u8>>> {
        self.map_at(variable, depth).map(encode_le_f64).transpose()
    }

    pub fn summary(&self) -> MapSummary {
        let layers = self
            .layers
            .iter()
            .map(|(variable, layer)| {
                let finite = layer.data.iter().copied().filter(|v| v.is_finite());
                let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
                let filled = layer.data.iter().filter(|v| v.is_finite()).count();
                LayerSummary {
                    variable: *variable,
                    unit: layer.unit.clone(),
                    reduction: layer.reduction,
                    min: (filled > 0).then_some(min),
                    max: (filled > 0).then_some(max),
                    filled_pixels: filled,
                    moments_retained: layer.moments.is_some(),
                }
            })
            .collect();
        MapSummary {
            run_id: self.run_id.to_string(),
            direction: self.direction,
            nx: self.grid.nx,
            ny: self.grid.ny,
            pixel_size: self.pixel_size(),
            effective_depth: self.effective_depth(),
            range_unit: self.range_unit.clone(),
            extent: self.extent,
            aspect_ratio: self.aspect_ratio(),
            layers,
            errors: self
                .errors
                .iter()
                .map(|(v, e)| (v.to_string(), e.to_string()))
                .collect(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            peak_concurrency: self.peak_concurrency,
            coarse_depths: self.coarse.keys().copied().collect(),
        }
    }
}

pub fn encode_le_f64(values: &[f64]) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<f64>());
    for &value in values {
        bytes.write_f64::<LittleEndian>(value)?;
    }
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub variable: Variable,
    pub unit: String,
    pub reduction: Reduction,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub filled_pixels: usize,
    pub moments_retained: bool,
}

/// 用于 JSON 响应的结果概览 (不含像素数据)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSummary {
    pub run_id: String,
    pub direction: Direction,
    pub nx: usize,
    pub ny: usize,
    pub pixel_size: f64,
    pub effective_depth: Option<u32>,
    pub range_unit: String,
    pub extent: MapExtent,
    pub aspect_ratio: f64,
    pub layers: Vec<LayerSummary>,
    pub errors: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub peak_concurrency: usize,
    pub coarse_depths: Vec<u32>,
}
