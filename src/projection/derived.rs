//! 派生变量：由存储字段组合出要送进累加器的值
//!
//! 柱坐标的轴固定为盒子的 z 轴，柱/球分量都相对 data_center。

use crate::error::DerivedVariableError;
use crate::projection::accumulator::Reduction;
use crate::record::{Field, Record, RecordKind};
use crate::variable::Variable;

/// 单条记录最多产生的分量数 (总离散度需要三个速度分量)
pub const MAX_COMPONENTS: usize = 3;

/// 绝热指数，用于声速
pub const GAMMA: f64 = 5.0 / 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Stored(Field),
    Speed,
    KineticEnergy,
    SoundSpeed,
    RCylinder,
    PhiCylinder,
    VrCylinder,
    VphiCylinder,
    RSphere,
    VrSphere,
}

impl Source {
    fn fields(self) -> &'static [Field] {
        match self {
            Source::Stored(Field::Rho) => &[Field::Rho],
            Source::Stored(Field::Vx) => &[Field::Vx],
            Source::Stored(Field::Vy) => &[Field::Vy],
            Source::Stored(Field::Vz) => &[Field::Vz],
            Source::Stored(Field::Pressure) => &[Field::Pressure],
            Source::Stored(Field::Mass) => &[Field::Mass],
            Source::Stored(Field::Birth) => &[Field::Birth],
            Source::Speed => &[Field::Vx, Field::Vy, Field::Vz],
            Source::KineticEnergy => &[Field::Mass, Field::Vx, Field::Vy, Field::Vz],
            Source::SoundSpeed => &[Field::Pressure, Field::Rho],
            Source::RCylinder | Source::PhiCylinder | Source::RSphere => &[],
            Source::VrCylinder | Source::VphiCylinder => &[Field::Vx, Field::Vy],
            Source::VrSphere => &[Field::Vx, Field::Vy, Field::Vz],
        }
    }

    fn needs_center(self) -> bool {
        matches!(
            self,
            Source::RCylinder
                | Source::PhiCylinder
                | Source::VrCylinder
                | Source::VphiCylinder
                | Source::RSphere
                | Source::VrSphere
        )
    }
}

fn plan(variable: Variable) -> (Reduction, Vec<Source>) {
    use Source::*;
    match variable {
        Variable::Rho => (Reduction::Mean, vec![Stored(Field::Rho)]),
        Variable::Vx => (Reduction::Mean, vec![Stored(Field::Vx)]),
        Variable::Vy => (Reduction::Mean, vec![Stored(Field::Vy)]),
        Variable::Vz => (Reduction::Mean, vec![Stored(Field::Vz)]),
        Variable::Pressure => (Reduction::Mean, vec![Stored(Field::Pressure)]),
        Variable::Birth => (Reduction::Mean, vec![Stored(Field::Birth)]),
        Variable::Mass => (Reduction::Sum { per_area: false }, vec![Stored(Field::Mass)]),
        Variable::SurfaceDensity => (Reduction::Sum { per_area: true }, vec![Stored(Field::Mass)]),
        Variable::Speed => (Reduction::Mean, vec![Speed]),
        Variable::KineticEnergy => (Reduction::Mean, vec![KineticEnergy]),
        Variable::SoundSpeed => (Reduction::Mean, vec![SoundSpeed]),
        Variable::RCylinder => (Reduction::Mean, vec![RCylinder]),
        Variable::PhiCylinder => (Reduction::Mean, vec![PhiCylinder]),
        Variable::VrCylinder => (Reduction::Mean, vec![VrCylinder]),
        Variable::VphiCylinder => (Reduction::Mean, vec![VphiCylinder]),
        Variable::RSphere => (Reduction::Mean, vec![RSphere]),
        Variable::VrSphere => (Reduction::Mean, vec![VrSphere]),
        Variable::SigmaX => (Reduction::Dispersion, vec![Stored(Field::Vx)]),
        Variable::SigmaY => (Reduction::Dispersion, vec![Stored(Field::Vy)]),
        Variable::SigmaZ => (Reduction::Dispersion, vec![Stored(Field::Vz)]),
        Variable::Sigma => (
            Reduction::Dispersion,
            vec![Stored(Field::Vx), Stored(Field::Vy), Stored(Field::Vz)],
        ),
        Variable::SigmaRCylinder => (Reduction::Dispersion, vec![VrCylinder]),
        Variable::SigmaPhiCylinder => (Reduction::Dispersion, vec![VphiCylinder]),
    }
}

/// 为某个变量准备好的取值器
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedVariableResolver {
    variable: Variable,
    reduction: Reduction,
    sources: Vec<Source>,
    box_length: f64,
    data_center: [f64; 3],
}

impl DerivedVariableResolver {
    /// 检查变量对这类记录是否可算；不可算时只让这一个变量失败
    pub fn resolve(
        variable: Variable,
        kind: RecordKind,
        box_length: f64,
        data_center: Option<[f64; 3]>,
    ) -> Result<Self, DerivedVariableError> {
        let (reduction, sources) = plan(variable);
        for source in &sources {
            if source.fields().iter().any(|f| !f.available_for(kind)) {
                return Err(DerivedVariableError::UnsupportedForKind { variable, kind });
            }
        }
        let needs_center = sources.iter().any(|s| s.needs_center());
        let data_center = match (needs_center, data_center) {
            (true, None) => return Err(DerivedVariableError::MissingDataCenter(variable)),
            (_, Some(c)) => c,
            (false, None) => [0.0; 3],
        };
        Ok(Self {
            variable,
            reduction,
            sources,
            box_length,
            data_center,
        })
    }

    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn components(&self) -> usize {
        self.sources.len()
    }

    /// 计算一条记录的取值，写入 `out[..components]`
    pub fn sample<R: Record>(
        &self,
        record: &R,
        out: &mut [f64; MAX_COMPONENTS],
    ) -> Result<usize, DerivedVariableError> {
        for (slot, source) in out.iter_mut().zip(&self.sources) {
            *slot = self.evaluate(*source, record)?;
        }
        Ok(self.sources.len())
    }

    fn field<R: Record>(&self, record: &R, field: Field) -> Result<f64, DerivedVariableError> {
        record
            .field(field, self.box_length)
            .ok_or(DerivedVariableError::MissingField {
                variable: self.variable,
                field,
            })
    }

    fn velocity<R: Record>(&self, record: &R) -> Result<[f64; 3], DerivedVariableError> {
        Ok([
            self.field(record, Field::Vx)?,
            self.field(record, Field::Vy)?,
            self.field(record, Field::Vz)?,
        ])
    }

    fn offset<R: Record>(&self, record: &R) -> [f64; 3] {
        let pos = record.position(self.box_length);
        [
            pos[0] - self.data_center[0],
            pos[1] - self.data_center[1],
            pos[2] - self.data_center[2],
        ]
    }

    fn evaluate<R: Record>(&self, source: Source, record: &R) -> Result<f64, DerivedVariableError> {
        let value = match source {
            Source::Stored(field) => self.field(record, field)?,
            Source::Speed => {
                let v = self.velocity(record)?;
                (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
            }
            Source::KineticEnergy => {
                let v = self.velocity(record)?;
                let m = self.field(record, Field::Mass)?;
                0.5 * m * (v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
            }
            Source::SoundSpeed => {
                let p = self.field(record, Field::Pressure)?;
                let rho = self.field(record, Field::Rho)?;
                if rho > 0.0 { (GAMMA * p / rho).max(0.0).sqrt() } else { 0.0 }
            }
            Source::RCylinder => {
                let d = self.offset(record);
                d[0].hypot(d[1])
            }
            Source::PhiCylinder => {
                let d = self.offset(record);
                d[1].atan2(d[0])
            }
            Source::VrCylinder | Source::VphiCylinder => {
                let d = self.offset(record);
                let vx = self.field(record, Field::Vx)?;
                let vy = self.field(record, Field::Vy)?;
                let r = d[0].hypot(d[1]);
                if r == 0.0 {
                    0.0
                } else if source == Source::VrCylinder {
                    (d[0] * vx + d[1] * vy) / r
                } else {
                    (d[0] * vy - d[1] * vx) / r
                }
            }
            Source::RSphere => {
                let d = self.offset(record);
                (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
            }
            Source::VrSphere => {
                let d = self.offset(record);
                let v = self.velocity(record)?;
                let r = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
                if r == 0.0 { 0.0 } else { (d[0] * v[0] + d[1] * v[1] + d[2] * v[2]) / r }
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CellRecord, ParticleRecord};

    fn sample_one<R: Record>(resolver: &DerivedVariableResolver, record: &R) -> f64 {
        let mut out = [0.0; MAX_COMPONENTS];
        assert_eq!(resolver.sample(record, &mut out).unwrap(), 1);
        out[0]
    }

    #[test]
    fn stored_fields_pass_through() {
        let cell = CellRecord::new(1, [1, 1, 1]).with_rho(3.0).with_velocity([1.0, 2.0, 2.0]);
        let rho = DerivedVariableResolver::resolve(Variable::Rho, RecordKind::Cell, 1.0, None).unwrap();
        assert_eq!(sample_one(&rho, &cell), 3.0);
        let speed =
            DerivedVariableResolver::resolve(Variable::Speed, RecordKind::Cell, 1.0, None).unwrap();
        assert_eq!(sample_one(&speed, &cell), 3.0);
        let ekin = DerivedVariableResolver::resolve(Variable::KineticEnergy, RecordKind::Cell, 1.0, None)
            .unwrap();
        // 质量 3 × 0.125 = 0.375
        assert_eq!(sample_one(&ekin, &cell), 0.5 * 0.375 * 9.0);
    }

    #[test]
    fn sound_speed_for_cells_only() {
        let cell = CellRecord::new(0, [1, 1, 1]).with_rho(1.0).with_pressure(0.6);
        let cs = DerivedVariableResolver::resolve(Variable::SoundSpeed, RecordKind::Cell, 1.0, None)
            .unwrap();
        assert!((sample_one(&cs, &cell) - 1.0).abs() < 1e-12);
        assert_eq!(
            DerivedVariableResolver::resolve(Variable::SoundSpeed, RecordKind::Particle, 1.0, None),
            Err(DerivedVariableError::UnsupportedForKind {
                variable: Variable::SoundSpeed,
                kind: RecordKind::Particle
            })
        );
    }

    #[test]
    fn cylindrical_components_relative_to_data_center() {
        let center = Some([0.5, 0.5, 0.5]);
        // 粒子在中心 +x 方向 0.25 处，速度沿 +y：纯切向
        let part = ParticleRecord::new([0.75, 0.5, 0.9], 1.0).with_velocity([0.0, 2.0, 7.0]);
        let resolve = |v| DerivedVariableResolver::resolve(v, RecordKind::Particle, 1.0, center).unwrap();
        assert_eq!(sample_one(&resolve(Variable::RCylinder), &part), 0.25);
        assert_eq!(sample_one(&resolve(Variable::PhiCylinder), &part), 0.0);
        assert_eq!(sample_one(&resolve(Variable::VrCylinder), &part), 0.0);
        assert_eq!(sample_one(&resolve(Variable::VphiCylinder), &part), 2.0);
        let r = sample_one(&resolve(Variable::RSphere), &part);
        assert!((r - (0.25f64 * 0.25 + 0.4 * 0.4).sqrt()).abs() < 1e-12);
        let vr = sample_one(&resolve(Variable::VrSphere), &part);
        assert!((vr - 0.4 * 7.0 / r).abs() < 1e-12);
    }

    #[test]
    fn radial_variables_need_a_center() {
        assert_eq!(
            DerivedVariableResolver::resolve(Variable::VrCylinder, RecordKind::Cell, 1.0, None),
            Err(DerivedVariableError::MissingDataCenter(Variable::VrCylinder))
        );
        assert!(
            DerivedVariableResolver::resolve(Variable::SigmaPhiCylinder, RecordKind::Cell, 1.0, None)
                .is_err()
        );
    }

    #[test]
    fn total_dispersion_samples_three_components() {
        let resolver =
            DerivedVariableResolver::resolve(Variable::Sigma, RecordKind::Particle, 1.0, None).unwrap();
        assert_eq!(resolver.reduction(), Reduction::Dispersion);
        let part = ParticleRecord::new([0.1, 0.1, 0.1], 1.0).with_velocity([1.0, 2.0, 3.0]);
        let mut out = [0.0; MAX_COMPONENTS];
        assert_eq!(resolver.sample(&part, &mut out), Ok(3));
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn surface_density_is_extensive() {
        let resolver =
            DerivedVariableResolver::resolve(Variable::SurfaceDensity, RecordKind::Cell, 1.0, None)
                .unwrap();
        assert_eq!(resolver.reduction(), Reduction::Sum { per_area: true });
        let cell = CellRecord::new(1, [1, 1, 1]).with_rho(8.0);
        assert_eq!(sample_one(&resolver, &cell), 1.0);
    }
}
