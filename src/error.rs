use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::projection::coords::Direction;
use crate::record::{Field, RecordKind};
use crate::request::WeightingMode;
use crate::variable::Variable;

/// 请求校验错误：在任何累加开始之前同步返回，整个调用失败
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidRequestError {
    #[error("未请求任何变量")]
    NoVariables,
    #[error("未知变量名: {0}")]
    UnknownVariable(String),
    #[error("变量重复请求: {0}")]
    DuplicateVariable(Variable),
    #[error("未知单位: {0}")]
    UnknownUnit(String),
    #[error("{axis} 方向范围宽度为零: [{min}, {max}]")]
    ZeroWidthRange { axis: Direction, min: f64, max: f64 },
    #[error("分辨率必须为正: {0}")]
    NonPositiveResolution(String),
    #[error("像素网格过大: {nx} x {ny}")]
    ResolutionTooLarge { nx: usize, ny: usize },
    #[error("中心坐标 {axis} 无法解析")]
    UnresolvedCenter { axis: Direction },
    #[error("data_center 坐标 {axis} 无法解析")]
    UnresolvedDataCenter { axis: Direction },
    #[error("max_concurrency 必须至少为 1")]
    ZeroConcurrency,
    #[error("掩码长度 {found} 与记录数 {expected} 不一致")]
    MaskLengthMismatch { expected: usize, found: usize },
    #[error("权重模式 {mode} 不适用于{kind}记录")]
    UnsupportedWeighting { mode: WeightingMode, kind: RecordKind },
    #[error("盒子边长无效: {0}")]
    InvalidBoxLength(f64),
}

/// 派生变量无法计算，只影响该变量本身
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DerivedVariableError {
    #[error("变量 {variable} 不支持{kind}记录")]
    UnsupportedForKind { variable: Variable, kind: RecordKind },
    #[error("变量 {0} 需要 data_center")]
    MissingDataCenter(Variable),
    #[error("变量 {variable} 所需字段 {field} 在记录中不存在")]
    MissingField { variable: Variable, field: Field },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccumulatorError {
    #[error("像素索引越界: {index} (像素总数 {len})")]
    PixelOutOfBounds { index: usize, len: usize },
    #[error("权重无效: {0}")]
    InvalidWeight(f64),
    #[error("分量数不匹配: 期望 {expected}, 实际 {found}")]
    ComponentMismatch { expected: usize, found: usize },
}

/// 工作线程边界上捕获的单变量错误，记录在结果里，不影响其他变量
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    #[error(transparent)]
    Derived(#[from] DerivedVariableError),
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),
    #[error("工作线程异常退出: {0}")]
    WorkerPanicked(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemapAlignmentError {
    #[error("源像素尺寸不是 box_length / 2^L，无法重映射")]
    NotPowerOfTwo,
    #[error("目标深度 {target} 大于源深度 {source_depth}")]
    TargetTooFine { target: u32, source_depth: u32 },
    #[error("{axis} 方向像素网格 (起点 {origin}, 长度 {len}) 无法按 {factor} 对齐")]
    Misaligned {
        axis: &'static str,
        origin: i64,
        len: usize,
        factor: usize,
    },
}

/// 某变量没有任何记录落入像素网格：不是错误，结果为全哨兵 (NaN) 图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmptyResultWarning {
    pub variable: Variable,
}

impl fmt::Display for EmptyResultWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "变量 {} 没有任何有效记录，结果为全 NaN", self.variable)
    }
}
