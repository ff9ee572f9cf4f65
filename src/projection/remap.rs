//! 粗化重映射：不回读源记录，把已完成的图合并到 2 的幂次更粗的网格上

use std::collections::BTreeMap;

use log::{debug, info};

use crate::error::RemapAlignmentError;
use crate::map_result::{CoarseMap, MapExtent, MapLayer, MapResult};
use crate::projection::accumulator::Reduction;
use crate::projection::binner::PixelGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoarseRemapper {
    source_depth: u32,
    target_depth: u32,
    factor: usize,
}

impl CoarseRemapper {
    /// 检查源图能否对齐到 `target_depth`
    pub fn new(grid: &PixelGrid, target_depth: u32) -> Result<Self, RemapAlignmentError> {
        let source_depth = grid.depth.ok_or(RemapAlignmentError::NotPowerOfTwo)?;
        if target_depth > source_depth {
            return Err(RemapAlignmentError::TargetTooFine {
                target: target_depth,
                source_depth,
            });
        }
        let factor = 1usize
            .checked_shl(source_depth - target_depth)
            .ok_or(RemapAlignmentError::NotPowerOfTwo)?;
        let checks = [("x", grid.i0, grid.nx), ("y", grid.j0, grid.ny)];
        for (axis, origin, len) in checks {
            if origin.rem_euclid(factor as i64) != 0 || len % factor != 0 {
                return Err(RemapAlignmentError::Misaligned {
                    axis,
                    origin,
                    len,
                    factor,
                });
            }
        }
        Ok(Self {
            source_depth,
            target_depth,
            factor,
        })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn target_grid(&self, grid: &PixelGrid) -> PixelGrid {
        grid.coarsened(self.factor, Some(self.target_depth))
    }

    /// 单个变量：有累加量时精确重算，否则对有限的细像素值求等权平均
    pub fn remap_layer(&self, layer: &MapLayer, fine: &PixelGrid, coarse: &PixelGrid) -> Vec<f64> {
        if let Some(moments) = &layer.moments {
            if let Some(sums) = moments.coarsen(self.factor) {
                return sums
                    .finalize(layer.reduction, coarse.pixel_area())
                    .into_iter()
                    .map(|v| v * layer.unit_factor)
                    .collect();
            }
        }
        self.block_fallback(&layer.data, layer.reduction, fine, coarse)
    }

    fn block_fallback(
        &self,
        data: &[f64],
        reduction: Reduction,
        fine: &PixelGrid,
        coarse: &PixelGrid,
    ) -> Vec<f64> {
        let mut sum = vec![0.0; coarse.len()];
        let mut count = vec![0usize; coarse.len()];
        for j in 0..fine.ny {
            for i in 0..fine.nx {
                let value = data[fine.index(i, j)];
                if value.is_finite() {
                    let q = coarse.index(i / self.factor, j / self.factor);
                    sum[q] += value;
                    count[q] += 1;
                }
            }
        }
        sum.into_iter()
            .zip(count)
            .map(|(s, n)| match (n, reduction) {
                (0, _) => f64::NAN,
                (_, Reduction::Sum { per_area: false }) => s,
                (n, _) => s / n as f64,
            })
            .collect()
    }
}

/// 在 `source` 的副本上追加 `target_depth` 的粗图
pub fn remap(source: &MapResult, target_depth: u32) -> Result<MapResult, RemapAlignmentError> {
    let remapper = CoarseRemapper::new(&source.grid, target_depth)?;
    let coarse_grid = remapper.target_grid(&source.grid);
    info!(
        "[重映射] {} 层 -> {} 层，网格 {}x{} -> {}x{}",
        remapper.source_depth,
        target_depth,
        source.grid.nx,
        source.grid.ny,
        coarse_grid.nx,
        coarse_grid.ny
    );

    let maps: BTreeMap<_, _> = source
        .layers
        .iter()
        .map(|(variable, layer)| {
            debug!(
                "[重映射] {} 使用{}",
                variable,
                if layer.moments.is_some() { "累加量" } else { "等权平均" }
            );
            (*variable, remapper.remap_layer(layer, &source.grid, &coarse_grid))
        })
        .collect();

    let extent = MapExtent::of_grid(&coarse_grid, source.direction, source.center, source.range_scale);
    let mut result = source.clone();
    result.coarse.insert(
        target_depth,
        CoarseMap {
            depth: target_depth,
            grid: coarse_grid,
            extent,
            maps,
        },
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::accumulator::WeightedAccumulator;

    fn grid(depth: u32, u: (f64, f64)) -> PixelGrid {
        PixelGrid::new(1.0 / 2f64.powi(depth as i32), u, (0.0, 1.0), 1.0).unwrap()
    }

    #[test]
    fn rejects_bad_targets() {
        assert_eq!(
            CoarseRemapper::new(&grid(3, (0.0, 1.0)), 4),
            Err(RemapAlignmentError::TargetTooFine {
                target: 4,
                source_depth: 3
            })
        );
        let thirds = PixelGrid::new(1.0 / 3.0, (0.0, 1.0), (0.0, 1.0), 1.0).unwrap();
        assert_eq!(CoarseRemapper::new(&thirds, 0), Err(RemapAlignmentError::NotPowerOfTwo));
        // x 起点在第 1 个像素，无法按 2 对齐
        let offset = grid(3, (0.125, 0.625));
        assert!(matches!(
            CoarseRemapper::new(&offset, 2),
            Err(RemapAlignmentError::Misaligned { axis: "x", origin: 1, .. })
        ));
        assert_eq!(CoarseRemapper::new(&grid(3, (0.0, 1.0)), 3).map(|r| r.factor()), Ok(1));
    }

    #[test]
    fn weighted_remap_uses_retained_sums() {
        let fine = grid(1, (0.0, 1.0));
        let mut moments = WeightedAccumulator::new(2, 2, 1, false);
        moments.add(0, 1.0, 3.0, 1.0).unwrap();
        moments.add(1, 5.0, 1.0, 1.0).unwrap();
        let layer = MapLayer {
            data: moments.finalize(Reduction::Mean, fine.pixel_area()),
            unit: "standard".into(),
            unit_factor: 2.0,
            reduction: Reduction::Mean,
            moments: Some(moments),
        };
        let remapper = CoarseRemapper::new(&fine, 0).unwrap();
        let coarse = remapper.target_grid(&fine);
        assert_eq!((coarse.nx, coarse.ny), (1, 1));
        // (1·3 + 5·1) / 4 = 2，再乘单位系数
        assert_eq!(remapper.remap_layer(&layer, &fine, &coarse), vec![4.0]);
    }

    #[test]
    fn fallback_is_unweighted_mean_of_finite_values() {
        let fine = grid(1, (0.0, 1.0));
        let layer = MapLayer {
            data: vec![1.0, f64::NAN, 2.0, 6.0],
            unit: "standard".into(),
            unit_factor: 1.0,
            reduction: Reduction::Mean,
            moments: None,
        };
        let remapper = CoarseRemapper::new(&fine, 0).unwrap();
        let coarse = remapper.target_grid(&fine);
        assert_eq!(remapper.remap_layer(&layer, &fine, &coarse), vec![3.0]);

        let empty = MapLayer {
            data: vec![f64::NAN; 4],
            ..layer
        };
        assert!(remapper.remap_layer(&empty, &fine, &coarse)[0].is_nan());
    }
}
