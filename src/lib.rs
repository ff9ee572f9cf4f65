//! AMR 投影与聚合引擎
//!
//! 把多层级的网格单元 (cell) 与粒子记录投影到固定分辨率的二维像素图上，
//! 按质量 (或体积、或等权) 加权聚合，并支持在已有结果上做粗化重映射。
//!
//! 入口只有两个：[`project`] 与 [`remap`]。

pub mod error;
pub mod map_result;
pub mod parser_registry;
pub mod parsers;
pub mod performance;
pub mod projection;
pub mod record;
pub mod request;
pub mod task;
pub mod units;
pub mod utils;
pub mod variable;

pub use error::{
    AccumulatorError, DerivedVariableError, EmptyResultWarning, InvalidRequestError,
    RemapAlignmentError, VariableError,
};
pub use map_result::{CoarseMap, MapExtent, MapLayer, MapResult, MapSummary};
pub use parsers::Dataset;
pub use projection::coords::Direction;
pub use projection::{project, remap};
pub use record::{CellRecord, Field, ParticleRecord, Record, RecordKind};
pub use request::{
    CenterCoord, ProgressCallback, ProgressEvent, ProjectionRequest, ProjectionRequestBuilder,
    RequestSpec, ResolutionSpec, WeightingMode,
};
pub use units::{SimulationInfo, UnitScale, UnitTable};
pub use variable::Variable;
