//! 投影与聚合引擎
//!
//! 数据流：记录 -> [`coords::CoordinateMapper`] -> [`binner::LevelBinner`]
//! -> [`derived::DerivedVariableResolver`] -> [`accumulator::WeightedAccumulator`]，
//! 每个变量一条流水线，由 [`scheduler::ThreadScheduler`] 调度。

pub mod accumulator;
pub mod binner;
pub mod coords;
pub mod derived;
pub mod remap;
pub mod scheduler;

use std::collections::BTreeMap;
use std::time::Instant;

use log::{info, warn};
use uuid::Uuid;

use crate::error::{DerivedVariableError, EmptyResultWarning, InvalidRequestError, VariableError};
use crate::map_result::{MapExtent, MapLayer, MapResult};
use crate::performance::PerformanceRecord;
use crate::record::{Field, Record};
use crate::request::{ProgressEvent, ProjectionRequest};
use crate::variable::Variable;

use accumulator::{Reduction, WeightedAccumulator};
use binner::LevelBinner;
use coords::CoordinateMapper;
use derived::{DerivedVariableResolver, MAX_COMPONENTS};
use scheduler::ThreadScheduler;

pub use remap::remap;

struct Accumulated {
    accumulator: WeightedAccumulator,
    reduction: Reduction,
    records_binned: usize,
}

/// 把记录投影到请求的像素网格上
///
/// 请求与记录集不匹配时整体失败；单个变量的错误记录在结果里，不影响其他变量。
pub fn project<R: Record>(
    records: &[R],
    request: &ProjectionRequest,
) -> Result<MapResult, InvalidRequestError> {
    request.check_records(records.len(), R::KIND)?;

    let run_id = Uuid::new_v4();
    let started = Instant::now();
    let grid = request.grid();
    info!(
        "[投影] {} 开始: {} 条{}记录, {} 个变量, 网格 {}x{}, 方向 {}, 并发上限 {}",
        run_id,
        records.len(),
        R::KIND,
        request.variables().len(),
        grid.nx,
        grid.ny,
        request.direction(),
        request.max_concurrency()
    );

    let mapper = request.mapper();
    let binner = request.binner();
    let scheduler = ThreadScheduler::new(request.max_concurrency());
    let schedule = scheduler.run(request.variables(), |slot, requested| {
        let variable = requested.variable;
        request.notify(ProgressEvent::VariableStarted { variable, slot });
        let outcome = accumulate(records, request, &mapper, &binner, variable);
        request.notify(ProgressEvent::VariableFinished {
            variable,
            slot,
            ok: outcome.is_ok(),
            records_binned: outcome.as_ref().map_or(0, |o| o.records_binned),
        });
        outcome
    });

    let mut layers = BTreeMap::new();
    let mut errors = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut timings = Vec::with_capacity(schedule.reports.len());

    for (requested, report) in request.variables().iter().zip(schedule.reports) {
        let variable = requested.variable;
        let (ok, records_binned, msg) = match report.output {
            Ok(out) => {
                if out.records_binned == 0 {
                    warn!("[投影] {} 没有任何有效记录", variable);
                    warnings.push(EmptyResultWarning { variable });
                }
                let data = out
                    .accumulator
                    .finalize(out.reduction, grid.pixel_area())
                    .into_iter()
                    .map(|v| v * requested.factor)
                    .collect();
                layers.insert(
                    variable,
                    MapLayer {
                        data,
                        unit: requested.unit.clone(),
                        unit_factor: requested.factor,
                        reduction: out.reduction,
                        moments: request.retain_moments().then_some(out.accumulator),
                    },
                );
                (true, out.records_binned, format!("{} 条记录", out.records_binned))
            }
            Err(e) => {
                warn!("[投影] 变量 {} 失败: {}", variable, e);
                let msg = e.to_string();
                errors.insert(variable, e);
                (false, 0, msg)
            }
        };
        timings.push(PerformanceRecord {
            start_time: report.start_time,
            end_time: report.end_time,
            channel_group: run_id.to_string(),
            channel_index: format!("worker_{}", report.slot),
            variable: variable.to_string(),
            records_binned,
            ok,
            msg,
        });
    }

    request.notify(ProgressEvent::Completed {
        succeeded: layers.len(),
        failed: errors.len(),
    });
    info!(
        "[投影] {} 完成: 成功 {}, 失败 {}, 峰值并发 {}, 耗时 {:.2?}",
        run_id,
        layers.len(),
        errors.len(),
        schedule.peak_concurrency,
        started.elapsed()
    );

    Ok(MapResult {
        run_id,
        direction: request.direction(),
        grid: grid.clone(),
        box_length: request.box_length(),
        center: request.center(),
        range_unit: request.range_unit().to_string(),
        range_scale: request.range_scale(),
        extent: MapExtent::of_grid(grid, request.direction(), request.center(), request.range_scale()),
        layers,
        errors,
        warnings,
        timings,
        peak_concurrency: schedule.peak_concurrency,
        coarse: BTreeMap::new(),
    })
}

/// 单个变量的完整累加，只写自己的缓冲
fn accumulate<R: Record>(
    records: &[R],
    request: &ProjectionRequest,
    mapper: &CoordinateMapper,
    binner: &LevelBinner<'_>,
    variable: Variable,
) -> Result<Accumulated, VariableError> {
    let box_length = request.box_length();
    let resolver =
        DerivedVariableResolver::resolve(variable, R::KIND, box_length, request.data_center())?;
    let reduction = resolver.reduction();
    let grid = binner.grid();
    let mut accumulator =
        WeightedAccumulator::for_reduction(grid.nx, grid.ny, resolver.components(), reduction);

    let mut pixels = Vec::new();
    let mut values = [0.0; MAX_COMPONENTS];
    let mut records_binned = 0;
    for (index, record) in records.iter().enumerate() {
        if request.is_masked_out(index) {
            continue;
        }
        binner.bin(&mapper.map(record), &mut pixels);
        if pixels.is_empty() {
            continue;
        }
        let weight = record
            .weight(request.weighting(), box_length)
            .ok_or(DerivedVariableError::MissingField {
                variable,
                field: Field::Mass,
            })?;
        let n = resolver.sample(record, &mut values)?;
        for &(pixel, fraction) in &pixels {
            match reduction {
                Reduction::Sum { .. } => {
                    accumulator.add_extensive(pixel, values[0], weight, fraction)?
                }
                Reduction::Mean | Reduction::Dispersion => {
                    accumulator.add_sample(pixel, &values[..n], weight, fraction)?
                }
            }
        }
        records_binned += 1;
    }

    Ok(Accumulated {
        accumulator,
        reduction,
        records_binned,
    })
}
