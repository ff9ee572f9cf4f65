use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 代码单位本身，换算系数恒为 1
pub const STANDARD_UNIT: &str = "standard";

/// 单位换算查询：名称 -> 乘法系数 (代码单位 -> 物理单位)
pub trait UnitScale: Send + Sync {
    fn factor(&self, name: &str) -> Option<f64>;
}

/// 由上游读取器提供的单位换算表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitTable {
    factors: HashMap<String, f64>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, factor: f64) -> Self {
        self.insert(name, factor);
        self
    }

    pub fn insert(&mut self, name: &str, factor: f64) {
        self.factors.insert(name.to_string(), factor);
    }
}

impl UnitScale for UnitTable {
    fn factor(&self, name: &str) -> Option<f64> {
        if name == STANDARD_UNIT {
            return Some(1.0);
        }
        self.factors
            .get(name)
            .copied()
            .filter(|f| f.is_finite() && *f > 0.0)
    }
}

/// 模拟快照的元数据 (来自上游读取器)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInfo {
    /// 盒子边长，代码单位
    pub box_length: f64,
    #[serde(default)]
    pub levelmin: u32,
    #[serde(default)]
    pub levelmax: u32,
    #[serde(default)]
    pub units: UnitTable,
}

impl SimulationInfo {
    pub fn new(box_length: f64) -> Self {
        Self {
            box_length,
            levelmin: 0,
            levelmax: 0,
            units: UnitTable::new(),
        }
    }

    pub fn with_levels(mut self, levelmin: u32, levelmax: u32) -> Self {
        self.levelmin = levelmin;
        self.levelmax = levelmax;
        self
    }

    pub fn with_units(mut self, units: UnitTable) -> Self {
        self.units = units;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_unit_is_always_known() {
        let table = UnitTable::new();
        assert_eq!(table.factor(STANDARD_UNIT), Some(1.0));
        assert_eq!(table.factor("kpc"), None);
    }

    #[test]
    fn rejects_non_positive_factors() {
        let table = UnitTable::new().with("kpc", 48.8).with("broken", 0.0);
        assert_eq!(table.factor("kpc"), Some(48.8));
        assert_eq!(table.factor("broken"), None);
    }
}
