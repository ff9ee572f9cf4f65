use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidRequestError;

/// 支持投影的变量
///
/// 名称在请求构建时解析，未知名称直接报错而不是静默产生空图。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Variable {
    Rho,
    Vx,
    Vy,
    Vz,
    Pressure,
    Mass,
    Birth,
    SurfaceDensity,
    Speed,
    KineticEnergy,
    SoundSpeed,
    RCylinder,
    PhiCylinder,
    VrCylinder,
    VphiCylinder,
    RSphere,
    VrSphere,
    SigmaX,
    SigmaY,
    SigmaZ,
    Sigma,
    SigmaRCylinder,
    SigmaPhiCylinder,
}

impl Variable {
    pub const ALL: [Variable; 23] = [
        Variable::Rho,
        Variable::Vx,
        Variable::Vy,
        Variable::Vz,
        Variable::Pressure,
        Variable::Mass,
        Variable::Birth,
        Variable::SurfaceDensity,
        Variable::Speed,
        Variable::KineticEnergy,
        Variable::SoundSpeed,
        Variable::RCylinder,
        Variable::PhiCylinder,
        Variable::VrCylinder,
        Variable::VphiCylinder,
        Variable::RSphere,
        Variable::VrSphere,
        Variable::SigmaX,
        Variable::SigmaY,
        Variable::SigmaZ,
        Variable::Sigma,
        Variable::SigmaRCylinder,
        Variable::SigmaPhiCylinder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variable::Rho => "rho",
            Variable::Vx => "vx",
            Variable::Vy => "vy",
            Variable::Vz => "vz",
            Variable::Pressure => "p",
            Variable::Mass => "mass",
            Variable::Birth => "birth",
            Variable::SurfaceDensity => "sd",
            Variable::Speed => "v",
            Variable::KineticEnergy => "ekin",
            Variable::SoundSpeed => "cs",
            Variable::RCylinder => "r_cylinder",
            Variable::PhiCylinder => "phi_cylinder",
            Variable::VrCylinder => "vr_cylinder",
            Variable::VphiCylinder => "vphi_cylinder",
            Variable::RSphere => "r_sphere",
            Variable::VrSphere => "vr_sphere",
            Variable::SigmaX => "sigma_x",
            Variable::SigmaY => "sigma_y",
            Variable::SigmaZ => "sigma_z",
            Variable::Sigma => "sigma",
            Variable::SigmaRCylinder => "sigma_r_cylinder",
            Variable::SigmaPhiCylinder => "sigma_phi_cylinder",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Variable::ALL
            .iter()
            .copied()
            .find(|v| v.name() == name)
            .ok_or_else(|| InvalidRequestError::UnknownVariable(name.to_string()))
    }
}

impl TryFrom<String> for Variable {
    type Error = InvalidRequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Variable> for String {
    fn from(value: Variable) -> Self {
        value.name().to_string()
    }
}
