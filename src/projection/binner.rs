//! 像素网格与分层分箱
//!
//! 边界策略：记录是否参与投影只看足迹中心，所有区间左闭右开。
//! 平面内的区间是像素网格范围 (请求范围向外取整到整像素)，
//! 视线方向用请求范围。中心落入但足迹伸出网格的大单元，
//! 网格内各像素的份额重新归一化为 1，保证每条记录的权重全部落地。

use serde::Serialize;

use crate::error::InvalidRequestError;
use crate::projection::coords::Footprint;

/// 浮点取整容差：相对误差在此以内视为恰好落在像素边界上
const SNAP_EPS: f64 = 1e-9;

/// 单次投影允许的最大像素数
pub const MAX_PIXELS: usize = 1 << 26;

/// 像素下标的绝对值上限，f64 在此范围内能精确表示整数
const MAX_INDEX: f64 = (1u64 << 52) as f64;

fn snap(x: f64) -> f64 {
    let r = x.round();
    if (x - r).abs() <= SNAP_EPS * r.abs().max(1.0) {
        r
    } else {
        x
    }
}

/// 二维像素索引空间 `[0, nx) × [0, ny)`
///
/// 像素边界锚定在盒子原点：第 i 列覆盖 `[(i0 + i) * pixel_size, (i0 + i + 1) * pixel_size)`。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelGrid {
    pub nx: usize,
    pub ny: usize,
    /// 像素边长，代码单位
    pub pixel_size: f64,
    pub i0: i64,
    pub j0: i64,
    /// 像素边长恰为 `box_length / 2^depth` 时的 depth
    pub depth: Option<u32>,
}

impl PixelGrid {
    /// 由像素尺寸与平面内范围 (绝对代码单位) 构建网格
    pub fn new(
        pixel_size: f64,
        u_range: (f64, f64),
        v_range: (f64, f64),
        box_length: f64,
    ) -> Result<Self, InvalidRequestError> {
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(InvalidRequestError::NonPositiveResolution(format!(
                "像素尺寸 {pixel_size}"
            )));
        }
        let i0 = snap(u_range.0 / pixel_size).floor();
        let i1 = snap(u_range.1 / pixel_size).ceil();
        let j0 = snap(v_range.0 / pixel_size).floor();
        let j1 = snap(v_range.1 / pixel_size).ceil();
        // 先在浮点下检查范围，再转为整数下标
        let (nx, ny) = ((i1 - i0).max(1.0), (j1 - j0).max(1.0));
        let indexable = [i0, i1, j0, j1]
            .iter()
            .all(|b| b.is_finite() && b.abs() <= MAX_INDEX);
        if !indexable || nx * ny > MAX_PIXELS as f64 {
            return Err(InvalidRequestError::ResolutionTooLarge {
                nx: nx as usize,
                ny: ny as usize,
            });
        }
        let (nx, ny) = (nx as usize, ny as usize);
        let (i0, j0) = (i0 as i64, j0 as i64);
        Ok(Self {
            nx,
            ny,
            pixel_size,
            i0,
            j0,
            depth: depth_of(pixel_size, box_length),
        })
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    pub fn pixel_area(&self) -> f64 {
        self.pixel_size * self.pixel_size
    }

    pub fn u_extent(&self) -> (f64, f64) {
        (
            self.i0 as f64 * self.pixel_size,
            (self.i0 as f64 + self.nx as f64) * self.pixel_size,
        )
    }

    pub fn v_extent(&self) -> (f64, f64) {
        (
            self.j0 as f64 * self.pixel_size,
            (self.j0 as f64 + self.ny as f64) * self.pixel_size,
        )
    }

    /// 点所在像素 (i, j)，网格外返回 None
    pub fn pixel_of(&self, u: f64, v: f64) -> Option<(usize, usize)> {
        let i = self.column(u, self.i0);
        let j = self.column(v, self.j0);
        if !(i >= 0.0 && j >= 0.0 && i < self.nx as f64 && j < self.ny as f64) {
            return None;
        }
        Some((i as usize, j as usize))
    }

    /// 相对网格起点的像素列号，未截断到网格内
    fn column(&self, x: f64, origin: i64) -> f64 {
        snap(x / self.pixel_size).floor() - origin as f64
    }

    /// 按 `factor` 粗化后的网格；调用方负责保证对齐
    pub fn coarsened(&self, factor: usize, depth: Option<u32>) -> Self {
        let f = factor as i64;
        Self {
            nx: self.nx / factor,
            ny: self.ny / factor,
            pixel_size: self.pixel_size * factor as f64,
            i0: self.i0.div_euclid(f),
            j0: self.j0.div_euclid(f),
            depth,
        }
    }
}

fn depth_of(pixel_size: f64, box_length: f64) -> Option<u32> {
    let ratio = box_length / pixel_size;
    if !(ratio.is_finite() && ratio >= 1.0) {
        return None;
    }
    let depth = ratio.log2().round();
    if depth > 62.0 {
        return None;
    }
    let exact = 2f64.powi(depth as i32);
    ((exact - ratio).abs() <= SNAP_EPS * exact).then_some(depth as u32)
}

/// 决定足迹落入哪些像素，以及各自的份额
#[derive(Debug, Clone, Copy)]
pub struct LevelBinner<'a> {
    grid: &'a PixelGrid,
    u_range: (f64, f64),
    v_range: (f64, f64),
    w_range: (f64, f64),
}

impl<'a> LevelBinner<'a> {
    /// `w_range` 为视线方向的请求范围，绝对代码单位
    pub fn new(grid: &'a PixelGrid, w_range: (f64, f64)) -> Self {
        Self {
            grid,
            u_range: grid.u_extent(),
            v_range: grid.v_extent(),
            w_range,
        }
    }

    pub fn grid(&self) -> &PixelGrid {
        self.grid
    }

    /// 按中心判断记录是否参与投影
    pub fn includes(&self, fp: &Footprint) -> bool {
        let inside = |x: f64, (lo, hi): (f64, f64)| x >= lo && x < hi;
        inside(fp.w, self.w_range) && inside(fp.u, self.u_range) && inside(fp.v, self.v_range)
    }

    /// 把 (像素下标, 份额) 写入 `out`；不参与投影的记录不写任何内容
    pub fn bin(&self, fp: &Footprint, out: &mut Vec<(usize, f64)>) {
        out.clear();
        if !self.includes(fp) {
            return;
        }
        let grid = self.grid;
        let pix = grid.pixel_size;

        // 单元不大于像素 (或粒子)：整条记录落在中心所在像素
        // 中心已确认在网格内，钳制只修正上边界处的取整
        if 2.0 * fp.half_width <= pix * (1.0 + SNAP_EPS) {
            let (i, j) = grid.pixel_of(fp.u, fp.v).unwrap_or_else(|| {
                let clamp = |x: f64, origin: i64, n: usize| {
                    grid.column(x, origin).clamp(0.0, (n - 1) as f64) as usize
                };
                (clamp(fp.u, grid.i0, grid.nx), clamp(fp.v, grid.j0, grid.ny))
            });
            out.push((grid.index(i, j), 1.0));
            return;
        }

        // 单元大于像素：按覆盖面积均匀铺开，全部以像素为长度单位
        let side = snap(2.0 * fp.half_width / pix);
        let u_lo = snap((fp.u - fp.half_width) / pix) - grid.i0 as f64;
        let v_lo = snap((fp.v - fp.half_width) / pix) - grid.j0 as f64;
        let (u_hi, v_hi) = (u_lo + side, v_lo + side);
        let area = side * side;

        let i_start = u_lo.floor().max(0.0) as usize;
        let i_end = (u_hi.ceil().max(0.0) as usize).min(grid.nx);
        let j_start = v_lo.floor().max(0.0) as usize;
        let j_end = (v_hi.ceil().max(0.0) as usize).min(grid.ny);

        let mut total = 0.0;
        for j in j_start..j_end {
            let ov = overlap(v_lo, v_hi, j);
            if ov <= 0.0 {
                continue;
            }
            for i in i_start..i_end {
                let ou = overlap(u_lo, u_hi, i);
                if ou <= 0.0 {
                    continue;
                }
                let fraction = ou * ov / area;
                total += fraction;
                out.push((grid.index(i, j), fraction));
            }
        }

        if total > 0.0 && total < 1.0 - SNAP_EPS {
            for (_, fraction) in out.iter_mut() {
                *fraction /= total;
            }
        }
    }
}

fn overlap(lo: f64, hi: f64, k: usize) -> f64 {
    let k = k as f64;
    hi.min(k + 1.0) - lo.max(k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::coords::{CoordinateMapper, Direction};
    use crate::record::{CellRecord, ParticleRecord};

    fn full_grid(depth: u32) -> PixelGrid {
        PixelGrid::new(1.0 / 2f64.powi(depth as i32), (0.0, 1.0), (0.0, 1.0), 1.0).unwrap()
    }

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(Direction::Z, 1.0, [0.0; 3], 1.0)
    }

    #[test]
    fn grid_snaps_range_outward_to_whole_pixels() {
        let grid = PixelGrid::new(0.25, (0.3, 0.6), (0.0, 1.0), 1.0).unwrap();
        assert_eq!((grid.i0, grid.nx), (1, 2));
        assert_eq!(grid.u_extent(), (0.25, 0.75));
        assert_eq!((grid.j0, grid.ny), (0, 4));
        assert_eq!(grid.depth, Some(2));
    }

    #[test]
    fn depth_is_only_reported_for_power_of_two_pixels() {
        assert_eq!(full_grid(8).depth, Some(8));
        let grid = PixelGrid::new(1.0 / 3.0, (0.0, 1.0), (0.0, 1.0), 1.0).unwrap();
        assert_eq!(grid.depth, None);
        assert_eq!(grid.nx, 3);
    }

    #[test]
    fn rejects_non_positive_pixel_size() {
        assert!(matches!(
            PixelGrid::new(0.0, (0.0, 1.0), (0.0, 1.0), 1.0),
            Err(InvalidRequestError::NonPositiveResolution(_))
        ));
    }

    #[test]
    fn small_cell_lands_in_one_pixel() {
        let grid = full_grid(2);
        let binner = LevelBinner::new(&grid, (0.0, 1.0));
        let mut out = Vec::new();
        binner.bin(&mapper().map(&CellRecord::new(4, [7, 3, 1])), &mut out);
        // 中心 (0.40625, 0.15625) -> 像素 (1, 0)
        assert_eq!(out, vec![(1, 1.0)]);

        binner.bin(&mapper().map(&ParticleRecord::new([0.9, 0.9, 0.5], 1.0)), &mut out);
        assert_eq!(out, vec![(grid.index(3, 3), 1.0)]);
    }

    #[test]
    fn coarse_cell_splats_uniformly() {
        let grid = full_grid(2);
        let binner = LevelBinner::new(&grid, (0.0, 1.0));
        let mut out = Vec::new();
        binner.bin(&mapper().map(&CellRecord::new(1, [2, 1, 1])), &mut out);
        assert_eq!(out.len(), 4);
        let mut pixels: Vec<usize> = out.iter().map(|p| p.0).collect();
        pixels.sort();
        assert_eq!(pixels, vec![2, 3, 6, 7]);
        assert!(out.iter().all(|p| p.1 == 0.25));
    }

    #[test]
    fn unaligned_coarse_cell_uses_area_share() {
        let grid = PixelGrid::new(0.4, (0.0, 1.2), (0.0, 1.2), 2.0).unwrap();
        let binner = LevelBinner::new(&grid, (0.0, 2.0));
        let mut out = Vec::new();
        // 边长 1.0 的单元 [0, 1) x [0, 1)，像素边长 0.4
        let cell = CellRecord::new(1, [1, 1, 1]);
        let fp = CoordinateMapper::new(Direction::Z, 2.0, [0.0; 3], 1.0).map(&cell);
        binner.bin(&fp, &mut out);
        assert_eq!(out.len(), 9);
        let total: f64 = out.iter().map(|p| p.1).sum();
        assert!((total - 1.0).abs() < 1e-12);
        let corner = out.iter().find(|p| p.0 == grid.index(2, 2)).unwrap().1;
        assert!((corner - 0.04).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_records_are_dropped() {
        let grid = full_grid(2);
        let binner = LevelBinner::new(&grid, (0.0, 0.5));
        let mut out = vec![(0, 1.0)];
        binner.bin(&mapper().map(&CellRecord::new(2, [1, 1, 3])), &mut out);
        assert!(out.is_empty());
        binner.bin(&mapper().map(&ParticleRecord::new([1.5, 0.5, 0.1], 1.0)), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn boundary_inclusion_is_by_center_half_open() {
        // 网格只覆盖 u ∈ [0, 0.5)
        let grid = PixelGrid::new(0.25, (0.0, 0.5), (0.0, 1.0), 1.0).unwrap();
        let binner = LevelBinner::new(&grid, (0.0, 1.0));
        let mut out = Vec::new();

        // 粒子恰在上边界：排除
        binner.bin(&mapper().map(&ParticleRecord::new([0.5, 0.1, 0.1], 1.0)), &mut out);
        assert!(out.is_empty());
        // 粒子恰在下边界：包含
        binner.bin(&mapper().map(&ParticleRecord::new([0.0, 0.1, 0.1], 1.0)), &mut out);
        assert_eq!(out, vec![(0, 1.0)]);

        // level 1 单元中心 0.25，足迹 [0, 0.5)：完整落入
        binner.bin(&mapper().map(&CellRecord::new(1, [1, 1, 1])), &mut out);
        assert_eq!(out.iter().map(|p| p.1).sum::<f64>(), 1.0);

        // level 0 单元中心 0.5：中心在网格外，整条记录排除
        binner.bin(&mapper().map(&CellRecord::new(0, [1, 1, 1])), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn overhanging_footprint_is_renormalized() {
        // 网格 u ∈ [0, 0.75)，level 0 单元中心 0.5 被包含，但一部分伸出网格
        let grid = PixelGrid::new(0.25, (0.0, 0.75), (0.0, 1.0), 1.0).unwrap();
        let binner = LevelBinner::new(&grid, (0.0, 1.0));
        let mut out = Vec::new();
        binner.bin(&mapper().map(&CellRecord::new(0, [1, 1, 1])), &mut out);
        assert_eq!(out.len(), 12);
        let total: f64 = out.iter().map(|p| p.1).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(out.iter().all(|p| (p.1 - 1.0 / 12.0).abs() < 1e-15));
    }
}
