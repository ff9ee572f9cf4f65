use serde::Serialize;

use crate::error::AccumulatorError;

/// 单个像素上的规约方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// 加权平均 `Σ v·w·f / Σ w·f`
    Mean,
    /// 二阶矩离散度 `sqrt(max(<v²> - <v>², 0))`，多分量时各分量方差相加再开方
    Dispersion,
    /// 广延量求和 `Σ v·f`；`per_area` 时再除以像素面积
    Sum { per_area: bool },
}

impl Reduction {
    pub fn second_moment(self) -> bool {
        matches!(self, Reduction::Dispersion)
    }
}

/// 每个变量一份的像素累加缓冲：`weighted_sum` 与 `weight_sum`
///
/// `coverage` 只记几何份额，与权重无关；广延量靠它区分“没有记录”与“记录的值为 0”。
/// 多分量时 `weighted_sum` 按分量依次排列 (分量 c 的像素 p 在 `c * npix + p`)。
/// 只由计算该变量的工作线程写入。
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedAccumulator {
    nx: usize,
    ny: usize,
    components: usize,
    weighted_sum: Vec<f64>,
    square_sum: Option<Vec<f64>>,
    weight_sum: Vec<f64>,
    coverage: Vec<f64>,
}

impl WeightedAccumulator {
    pub fn new(nx: usize, ny: usize, components: usize, second_moment: bool) -> Self {
        let npix = nx * ny;
        let components = components.max(1);
        Self {
            nx,
            ny,
            components,
            weighted_sum: vec![0.0; npix * components],
            square_sum: second_moment.then(|| vec![0.0; npix * components]),
            weight_sum: vec![0.0; npix],
            coverage: vec![0.0; npix],
        }
    }

    pub fn for_reduction(nx: usize, ny: usize, components: usize, reduction: Reduction) -> Self {
        Self::new(nx, ny, components, reduction.second_moment())
    }

    pub fn len(&self) -> usize {
        self.weight_sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weight_sum.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn weight_sum(&self) -> &[f64] {
        &self.weight_sum
    }

    pub fn weighted_sum(&self, component: usize) -> &[f64] {
        let npix = self.len();
        &self.weighted_sum[component * npix..(component + 1) * npix]
    }

    pub fn coverage(&self) -> &[f64] {
        &self.coverage
    }

    fn check(&self, pixel: usize, weight: f64, fraction: f64) -> Result<f64, AccumulatorError> {
        if pixel >= self.len() {
            return Err(AccumulatorError::PixelOutOfBounds {
                index: pixel,
                len: self.len(),
            });
        }
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(AccumulatorError::InvalidWeight(weight));
        }
        let share = weight * fraction;
        if !(share.is_finite() && share >= 0.0) {
            return Err(AccumulatorError::InvalidWeight(share));
        }
        Ok(share)
    }

    /// `weighted_sum[p] += v·w·f`，`weight_sum[p] += w·f`
    pub fn add(
        &mut self,
        pixel: usize,
        value: f64,
        weight: f64,
        fraction: f64,
    ) -> Result<(), AccumulatorError> {
        self.add_sample(pixel, &[value], weight, fraction)
    }

    /// 多分量版本；二阶矩开启时同时累加 `v²·w·f`
    pub fn add_sample(
        &mut self,
        pixel: usize,
        values: &[f64],
        weight: f64,
        fraction: f64,
    ) -> Result<(), AccumulatorError> {
        if values.len() != self.components {
            return Err(AccumulatorError::ComponentMismatch {
                expected: self.components,
                found: values.len(),
            });
        }
        let share = self.check(pixel, weight, fraction)?;
        let npix = self.len();
        for (c, &value) in values.iter().enumerate() {
            let k = c * npix + pixel;
            self.weighted_sum[k] += value * share;
            if let Some(square) = self.square_sum.as_mut() {
                square[k] += value * value * share;
            }
        }
        self.weight_sum[pixel] += share;
        self.coverage[pixel] += fraction;
        Ok(())
    }

    /// 广延量：`weighted_sum[p] += v·f`，权重照常记录以标记像素已被覆盖
    pub fn add_extensive(
        &mut self,
        pixel: usize,
        value: f64,
        weight: f64,
        fraction: f64,
    ) -> Result<(), AccumulatorError> {
        if self.components != 1 {
            return Err(AccumulatorError::ComponentMismatch {
                expected: self.components,
                found: 1,
            });
        }
        let share = self.check(pixel, weight, fraction)?;
        self.weighted_sum[pixel] += value * fraction;
        self.weight_sum[pixel] += share;
        self.coverage[pixel] += fraction;
        Ok(())
    }

    /// 逐像素规约
    ///
    /// 平均与离散度在 `weight_sum == 0` 的像素为 NaN；
    /// 求和只在没有任何记录覆盖的像素为 NaN，质量为 0 的记录照常给出 0。
    pub fn finalize(&self, reduction: Reduction, pixel_area: f64) -> Vec<f64> {
        let npix = self.len();
        (0..npix)
            .map(|p| {
                let w = self.weight_sum[p];
                match reduction {
                    Reduction::Sum { per_area } => {
                        if self.coverage[p] <= 0.0 {
                            return f64::NAN;
                        }
                        let total = self.weighted_sum[p];
                        if per_area { total / pixel_area } else { total }
                    }
                    _ if w <= 0.0 => f64::NAN,
                    Reduction::Mean => self.weighted_sum[p] / w,
                    Reduction::Dispersion => {
                        let Some(square) = self.square_sum.as_ref() else {
                            return f64::NAN;
                        };
                        let variance: f64 = (0..self.components)
                            .map(|c| {
                                let k = c * npix + p;
                                let mean = self.weighted_sum[k] / w;
                                (square[k] / w - mean * mean).max(0.0)
                            })
                            .sum();
                        variance.sqrt()
                    }
                }
            })
            .collect()
    }

    /// 把 `factor × factor` 的像素块合并为一个粗像素：各项和直接相加
    ///
    /// 要求 `nx`、`ny` 都能被 `factor` 整除。
    pub fn coarsen(&self, factor: usize) -> Option<Self> {
        if factor == 0 || self.nx % factor != 0 || self.ny % factor != 0 {
            return None;
        }
        let (cnx, cny) = (self.nx / factor, self.ny / factor);
        let mut coarse = Self::new(cnx, cny, self.components, self.square_sum.is_some());
        let (fine_n, coarse_n) = (self.len(), coarse.len());
        for j in 0..self.ny {
            for i in 0..self.nx {
                let p = j * self.nx + i;
                let q = (j / factor) * cnx + i / factor;
                coarse.weight_sum[q] += self.weight_sum[p];
                coarse.coverage[q] += self.coverage[p];
                for c in 0..self.components {
                    coarse.weighted_sum[c * coarse_n + q] += self.weighted_sum[c * fine_n + p];
                    if let (Some(dst), Some(src)) =
                        (coarse.square_sum.as_mut(), self.square_sum.as_ref())
                    {
                        dst[c * coarse_n + q] += src[c * fine_n + p];
                    }
                }
            }
        }
        Some(coarse)
    }
}
