//! 投影请求：构建时一次性校验并换算成代码单位，之后不可变

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::InvalidRequestError;
use crate::projection::binner::{LevelBinner, PixelGrid};
use crate::projection::coords::{CoordinateMapper, Direction};
use crate::record::RecordKind;
use crate::units::{STANDARD_UNIT, SimulationInfo, UnitScale};
use crate::variable::Variable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingMode {
    /// 粒子取质量，网格单元取 `rho × 体积`
    #[default]
    Mass,
    /// 网格单元取体积；粒子不支持
    Volume,
    /// 每条记录权重为 1
    Unweighted,
}

impl fmt::Display for WeightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingMode::Mass => f.write_str("mass"),
            WeightingMode::Volume => f.write_str("volume"),
            WeightingMode::Unweighted => f.write_str("unweighted"),
        }
    }
}

/// 分辨率的三种给法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSpec {
    /// 整个盒子边长上的像素数
    Pixels(u32),
    /// 像素物理边长
    PixelSize { size: f64, unit: String },
    /// 由细化层级推出：像素边长 `box_length / 2^depth`
    Depth(u32),
}

/// 中心的单个坐标：盒子中心或显式值 (range_unit)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CenterRepr", into = "CenterRepr")]
pub enum CenterCoord {
    BoxCenter,
    Value(f64),
}

impl Default for CenterCoord {
    fn default() -> Self {
        CenterCoord::Value(0.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CenterRepr {
    Value(f64),
    Keyword(String),
}

impl TryFrom<CenterRepr> for CenterCoord {
    type Error = String;

    fn try_from(repr: CenterRepr) -> Result<Self, Self::Error> {
        match repr {
            CenterRepr::Value(v) => Ok(CenterCoord::Value(v)),
            CenterRepr::Keyword(k) if k == "bc" || k == "box_center" => Ok(CenterCoord::BoxCenter),
            CenterRepr::Keyword(k) => Err(format!("无法识别的中心坐标: {k}")),
        }
    }
}

impl From<CenterCoord> for CenterRepr {
    fn from(coord: CenterCoord) -> Self {
        match coord {
            CenterCoord::BoxCenter => CenterRepr::Keyword("bc".into()),
            CenterCoord::Value(v) => CenterRepr::Value(v),
        }
    }
}

/// 投影过程中的进度事件，由工作线程触发
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    VariableStarted {
        variable: Variable,
        slot: usize,
    },
    VariableFinished {
        variable: Variable,
        slot: usize,
        ok: bool,
        records_binned: usize,
    },
    Completed {
        succeeded: usize,
        failed: usize,
    },
}

/// 显式传入的进度回调，替代全局 verbose 开关
#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(&ProgressEvent) + Send + Sync>);

impl ProgressCallback {
    pub fn new(f: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn emit(&self, event: &ProgressEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressCallback")
    }
}

/// 已校验的变量及其输出单位
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedVariable {
    pub variable: Variable,
    pub unit: String,
    /// 代码单位 -> 输出单位
    pub factor: f64,
}

#[derive(Debug, Clone)]
pub struct ProjectionRequest {
    variables: Vec<RequestedVariable>,
    direction: Direction,
    grid: PixelGrid,
    w_range: (f64, f64),
    center: [f64; 3],
    data_center: Option<[f64; 3]>,
    range_unit: String,
    range_scale: f64,
    box_length: f64,
    weighting: WeightingMode,
    mask: Option<Vec<bool>>,
    max_concurrency: NonZeroUsize,
    retain_moments: bool,
    progress: Option<ProgressCallback>,
}

impl ProjectionRequest {
    /// `max_concurrency` 必须显式给出：引擎常被嵌套在外层并行循环里
    pub fn builder(max_concurrency: usize) -> ProjectionRequestBuilder {
        ProjectionRequestBuilder::new(max_concurrency)
    }

    pub fn variables(&self) -> &[RequestedVariable] {
        &self.variables
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    /// 视线方向范围，绝对代码单位
    pub fn w_range(&self) -> (f64, f64) {
        self.w_range
    }

    /// 中心，绝对代码单位
    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    pub fn data_center(&self) -> Option<[f64; 3]> {
        self.data_center
    }

    pub fn range_unit(&self) -> &str {
        &self.range_unit
    }

    pub fn range_scale(&self) -> f64 {
        self.range_scale
    }

    pub fn box_length(&self) -> f64 {
        self.box_length
    }

    pub fn weighting(&self) -> WeightingMode {
        self.weighting
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub fn max_concurrency(&self) -> NonZeroUsize {
        self.max_concurrency
    }

    pub fn retain_moments(&self) -> bool {
        self.retain_moments
    }

    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.direction, self.box_length, self.center, self.range_scale)
    }

    pub fn binner(&self) -> LevelBinner<'_> {
        LevelBinner::new(&self.grid, self.w_range)
    }

    /// 与记录集相关的校验 (掩码长度、权重模式)，在任何累加开始前执行
    pub fn check_records(&self, count: usize, kind: RecordKind) -> Result<(), InvalidRequestError> {
        if let Some(mask) = &self.mask {
            if mask.len() != count {
                return Err(InvalidRequestError::MaskLengthMismatch {
                    expected: count,
                    found: mask.len(),
                });
            }
        }
        if self.weighting == WeightingMode::Volume && kind == RecordKind::Particle {
            return Err(InvalidRequestError::UnsupportedWeighting {
                mode: self.weighting,
                kind,
            });
        }
        Ok(())
    }

    pub fn is_masked_out(&self, index: usize) -> bool {
        self.mask
            .as_ref()
            .is_some_and(|m| !m.get(index).copied().unwrap_or(false))
    }

    pub fn notify(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.emit(&event);
        }
    }
}

pub struct ProjectionRequestBuilder {
    variables: Vec<(Variable, String)>,
    direction: Direction,
    resolution: Option<ResolutionSpec>,
    ranges: [Option<(f64, f64)>; 3],
    range_unit: String,
    center: [CenterCoord; 3],
    data_center: Option<[CenterCoord; 3]>,
    weighting: WeightingMode,
    mask: Option<Vec<bool>>,
    max_concurrency: usize,
    retain_moments: bool,
    progress: Option<ProgressCallback>,
}

impl ProjectionRequestBuilder {
    fn new(max_concurrency: usize) -> Self {
        Self {
            variables: Vec::new(),
            direction: Direction::Z,
            resolution: None,
            ranges: [None; 3],
            range_unit: STANDARD_UNIT.to_string(),
            center: [CenterCoord::default(); 3],
            data_center: None,
            weighting: WeightingMode::Mass,
            mask: None,
            max_concurrency,
            retain_moments: true,
            progress: None,
        }
    }

    pub fn variable(self, variable: Variable) -> Self {
        self.variable_in(variable, STANDARD_UNIT)
    }

    pub fn variable_in(mut self, variable: Variable, unit: &str) -> Self {
        self.variables.push((variable, unit.to_string()));
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// 不设置时按 `levelmax` 推出
    pub fn resolution(mut self, resolution: ResolutionSpec) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// 相对 center 的范围，单位为 range_unit
    pub fn range(mut self, axis: Direction, min: f64, max: f64) -> Self {
        self.ranges[axis.index()] = Some((min, max));
        self
    }

    pub fn range_unit(mut self, unit: &str) -> Self {
        self.range_unit = unit.to_string();
        self
    }

    pub fn center(mut self, center: [CenterCoord; 3]) -> Self {
        self.center = center;
        self
    }

    pub fn data_center(mut self, center: [CenterCoord; 3]) -> Self {
        self.data_center = Some(center);
        self
    }

    pub fn weighting(mut self, weighting: WeightingMode) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn retain_moments(mut self, retain: bool) -> Self {
        self.retain_moments = retain;
        self
    }

    pub fn progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self, info: &SimulationInfo) -> Result<ProjectionRequest, InvalidRequestError> {
        let box_length = info.box_length;
        if !(box_length.is_finite() && box_length > 0.0) {
            return Err(InvalidRequestError::InvalidBoxLength(box_length));
        }
        let max_concurrency =
            NonZeroUsize::new(self.max_concurrency).ok_or(InvalidRequestError::ZeroConcurrency)?;

        if self.variables.is_empty() {
            return Err(InvalidRequestError::NoVariables);
        }
        let factor_of = |unit: &str| {
            info.units
                .factor(unit)
                .ok_or_else(|| InvalidRequestError::UnknownUnit(unit.to_string()))
        };
        let mut seen = HashSet::new();
        let mut variables = Vec::with_capacity(self.variables.len());
        for (variable, unit) in self.variables {
            if !seen.insert(variable) {
                return Err(InvalidRequestError::DuplicateVariable(variable));
            }
            let factor = factor_of(unit.as_str())?;
            variables.push(RequestedVariable {
                variable,
                unit,
                factor,
            });
        }

        let range_scale = factor_of(self.range_unit.as_str())?;
        let resolve = |coord: CenterCoord| match coord {
            CenterCoord::BoxCenter => Some(0.5 * box_length),
            CenterCoord::Value(v) if v.is_finite() => Some(v / range_scale),
            CenterCoord::Value(_) => None,
        };
        let mut center = [0.0; 3];
        for axis in Direction::ALL {
            center[axis.index()] = resolve(self.center[axis.index()])
                .ok_or(InvalidRequestError::UnresolvedCenter { axis })?;
        }
        let data_center = match self.data_center {
            Some(coords) => {
                let mut resolved = [0.0; 3];
                for axis in Direction::ALL {
                    resolved[axis.index()] = resolve(coords[axis.index()])
                        .ok_or(InvalidRequestError::UnresolvedDataCenter { axis })?;
                }
                Some(resolved)
            }
            None => None,
        };

        let mut ranges = [(0.0, box_length); 3];
        for axis in Direction::ALL {
            let k = axis.index();
            if let Some((min, max)) = self.ranges[k] {
                let lo = (center[k] + min / range_scale).max(0.0);
                let hi = (center[k] + max / range_scale).min(box_length);
                if !(lo.is_finite() && hi.is_finite() && hi > lo) {
                    return Err(InvalidRequestError::ZeroWidthRange { axis, min, max });
                }
                ranges[k] = (lo, hi);
            }
        }

        let resolution = self
            .resolution
            .unwrap_or(ResolutionSpec::Depth(info.levelmax));
        let pixel_size = match &resolution {
            ResolutionSpec::Pixels(0) => {
                return Err(InvalidRequestError::NonPositiveResolution("像素数为 0".into()));
            }
            ResolutionSpec::Pixels(n) => box_length / *n as f64,
            ResolutionSpec::PixelSize { size, unit } => {
                let factor = factor_of(unit.as_str())?;
                if !(size.is_finite() && *size > 0.0) {
                    return Err(InvalidRequestError::NonPositiveResolution(format!(
                        "像素尺寸 {size} {unit}"
                    )));
                }
                size / factor
            }
            ResolutionSpec::Depth(depth) if *depth > 30 => {
                return Err(InvalidRequestError::NonPositiveResolution(format!(
                    "层级 {depth} 超出范围"
                )));
            }
            ResolutionSpec::Depth(depth) => box_length / 2f64.powi(*depth as i32),
        };

        let (iu, iv, iw) = self.direction.axes();
        let grid = PixelGrid::new(pixel_size, ranges[iu], ranges[iv], box_length)?;

        Ok(ProjectionRequest {
            variables,
            direction: self.direction,
            grid,
            w_range: ranges[iw],
            center,
            data_center,
            range_unit: self.range_unit,
            range_scale,
            box_length,
            weighting: self.weighting,
            mask: self.mask,
            max_concurrency,
            retain_moments: self.retain_moments,
            progress: self.progress,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    #[serde(default)]
    pub x: Option<[f64; 2]>,
    #[serde(default)]
    pub y: Option<[f64; 2]>,
    #[serde(default)]
    pub z: Option<[f64; 2]>,
}

fn default_unit() -> String {
    STANDARD_UNIT.to_string()
}

fn default_true() -> bool {
    true
}

/// JSON 形式的请求 (HTTP 接口使用)，经 `into_builder` 解析变量名后再校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub variables: Vec<String>,
    /// 与 variables 一一对应，缺省为 standard
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub resolution: Option<ResolutionSpec>,
    #[serde(default)]
    pub range: RangeSpec,
    #[serde(default = "default_unit")]
    pub range_unit: String,
    #[serde(default)]
    pub center: [CenterCoord; 3],
    #[serde(default)]
    pub data_center: Option<[CenterCoord; 3]>,
    #[serde(default)]
    pub weighting: WeightingMode,
    pub max_concurrency: usize,
    #[serde(default = "default_true")]
    pub retain_moments: bool,
}

impl RequestSpec {
    pub fn into_builder(self) -> Result<ProjectionRequestBuilder, InvalidRequestError> {
        let mut builder = ProjectionRequest::builder(self.max_concurrency)
            .direction(self.direction)
            .range_unit(&self.range_unit)
            .center(self.center)
            .weighting(self.weighting)
            .retain_moments(self.retain_moments);
        for (k, name) in self.variables.iter().enumerate() {
            let variable: Variable = name.parse()?;
            let unit = self.units.get(k).map(String::as_str).unwrap_or(STANDARD_UNIT);
            builder = builder.variable_in(variable, unit);
        }
        if let Some(resolution) = self.resolution {
            builder = builder.resolution(resolution);
        }
        if let Some(center) = self.data_center {
            builder = builder.data_center(center);
        }
        let axes = [
            (Direction::X, self.range.x),
            (Direction::Y, self.range.y),
            (Direction::Z, self.range.z),
        ];
        for (axis, range) in axes {
            if let Some([min, max]) = range {
                builder = builder.range(axis, min, max);
            }
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitTable;

    fn info() -> SimulationInfo {
        SimulationInfo::new(1.0)
            .with_levels(2, 6)
            .with_units(UnitTable::new().with("kpc", 100.0).with("km_s", 10.0))
    }

    #[test]
    fn defaults_to_levelmax_over_full_box() {
        let req = ProjectionRequest::builder(2)
            .variable(Variable::Rho)
            .build(&info())
            .unwrap();
        assert_eq!((req.grid().nx, req.grid().ny), (64, 64));
        assert_eq!(req.grid().depth, Some(6));
        assert_eq!(req.w_range(), (0.0, 1.0));
        assert_eq!(req.max_concurrency().get(), 2);
    }

    #[test]
    fn ranges_are_relative_to_center_in_range_unit() {
        let req = ProjectionRequest::builder(1)
            .variable_in(Variable::Vx, "km_s")
            .range_unit("kpc")
            .center([CenterCoord::BoxCenter; 3])
            .range(Direction::X, -25.0, 25.0)
            .range(Direction::Z, -10.0, 10.0)
            .resolution(ResolutionSpec::Depth(3))
            .build(&info())
            .unwrap();
        assert_eq!(req.center(), [0.5; 3]);
        assert_eq!(req.grid().u_extent(), (0.25, 0.75));
        assert_eq!(req.grid().nx, 4);
        assert_eq!(req.grid().ny, 8);
        let (w0, w1) = req.w_range();
        assert!((w0 - 0.4).abs() < 1e-12 && (w1 - 0.6).abs() < 1e-12);
        assert_eq!(req.variables()[0].factor, 10.0);
    }

    #[test]
    fn pixel_size_and_pixel_count_specs() {
        let by_size = ProjectionRequest::builder(1)
            .variable(Variable::Rho)
            .resolution(ResolutionSpec::PixelSize {
                size: 25.0,
                unit: "kpc".into(),
            })
            .build(&info())
            .unwrap();
        assert_eq!(by_size.grid().nx, 4);
        assert_eq!(by_size.grid().depth, Some(2));

        let by_count = ProjectionRequest::builder(1)
            .variable(Variable::Rho)
            .resolution(ResolutionSpec::Pixels(10))
            .build(&info())
            .unwrap();
        assert_eq!(by_count.grid().nx, 10);
        assert_eq!(by_count.grid().depth, None);
    }

    #[test]
    fn tiny_pixel_size_is_rejected_instead_of_overflowing() {
        for size in [1e-300, 1e-12] {
            let err = ProjectionRequest::builder(1)
                .variable(Variable::Rho)
                .center([CenterCoord::BoxCenter; 3])
                .range(Direction::X, -25.0, 25.0)
                .range(Direction::Y, -25.0, 25.0)
                .resolution(ResolutionSpec::PixelSize {
                    size,
                    unit: "kpc".into(),
                })
                .build(&info())
                .unwrap_err();
            assert!(
                matches!(err, InvalidRequestError::ResolutionTooLarge { .. }),
                "{size}: {err:?}"
            );
        }
    }

    #[test]
    fn validation_failures() {
        let base = || ProjectionRequest::builder(1).variable(Variable::Rho);
        assert_eq!(
            ProjectionRequest::builder(1).build(&info()).unwrap_err(),
            InvalidRequestError::NoVariables
        );
        assert_eq!(
            ProjectionRequest::builder(0).variable(Variable::Rho).build(&info()).unwrap_err(),
            InvalidRequestError::ZeroConcurrency
        );
        assert_eq!(
            base().variable(Variable::Rho).build(&info()).unwrap_err(),
            InvalidRequestError::DuplicateVariable(Variable::Rho)
        );
        assert_eq!(
            base().variable_in(Variable::Vx, "parsec").build(&info()).unwrap_err(),
            InvalidRequestError::UnknownUnit("parsec".into())
        );
        assert_eq!(
            base().range(Direction::Y, 0.3, 0.3).build(&info()).unwrap_err(),
            InvalidRequestError::ZeroWidthRange {
                axis: Direction::Y,
                min: 0.3,
                max: 0.3
            }
        );
        assert!(matches!(
            base().resolution(ResolutionSpec::Pixels(0)).build(&info()),
            Err(InvalidRequestError::NonPositiveResolution(_))
        ));
        assert_eq!(
            base()
                .center([CenterCoord::Value(f64::NAN), CenterCoord::BoxCenter, CenterCoord::BoxCenter])
                .build(&info())
                .unwrap_err(),
            InvalidRequestError::UnresolvedCenter { axis: Direction::X }
        );
        assert!(matches!(
            base().build(&SimulationInfo::new(0.0)),
            Err(InvalidRequestError::InvalidBoxLength(_))
        ));
    }

    #[test]
    fn record_checks_cover_mask_and_weighting() {
        let req = ProjectionRequest::builder(1)
            .variable(Variable::Rho)
            .mask(vec![true, false])
            .weighting(WeightingMode::Volume)
            .build(&info())
            .unwrap();
        assert_eq!(
            req.check_records(3, RecordKind::Cell),
            Err(InvalidRequestError::MaskLengthMismatch {
                expected: 3,
                found: 2
            })
        );
        assert!(req.check_records(2, RecordKind::Cell).is_ok());
        assert!(matches!(
            req.check_records(2, RecordKind::Particle),
            Err(InvalidRequestError::UnsupportedWeighting { .. })
        ));
        assert!(!req.is_masked_out(0));
        assert!(req.is_masked_out(1));
    }

    #[test]
    fn request_spec_parses_from_json() {
        let json = r#"{
            "variables": ["rho", "sigma_x"],
            "units": ["standard", "km_s"],
            "direction": "y",
            "resolution": {"depth": 4},
            "range": {"x": [-0.25, 0.25]},
            "center": ["bc", "bc", 0.5],
            "weighting": "unweighted",
            "max_concurrency": 2
        }"#;
        let spec: RequestSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.center[2], CenterCoord::Value(0.5));
        let req = spec.into_builder().unwrap().build(&info()).unwrap();
        assert_eq!(req.direction(), Direction::Y);
        assert_eq!(req.variables()[1].variable, Variable::SigmaX);
        assert_eq!(req.variables()[1].unit, "km_s");
        assert_eq!(req.weighting(), WeightingMode::Unweighted);
        assert_eq!((req.grid().nx, req.grid().ny), (8, 16));
        assert!(req.retain_moments());
    }

    #[test]
    fn request_spec_rejects_unknown_variable_names() {
        let spec = RequestSpec {
            variables: vec!["rho".into(), "entropy".into()],
            units: vec![],
            direction: Direction::Z,
            resolution: None,
            range: RangeSpec::default(),
            range_unit: default_unit(),
            center: Default::default(),
            data_center: None,
            weighting: WeightingMode::Mass,
            max_concurrency: 1,
            retain_moments: true,
        };
        assert!(matches!(
            spec.into_builder(),
            Err(InvalidRequestError::UnknownVariable(name)) if name == "entropy"
        ));
    }
}
