use thiserror::Error;

use crate::parsers::{Dataset, DatasetInfo};

/// 数据集读取错误
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("读取文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON 格式错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("盒子边长无效: {0}")]
    InvalidBoxLength(f64),
    #[error("第 {index} 个单元的层级 {level} 不在 [{levelmin}, {levelmax}] 内")]
    InvalidLevel {
        index: usize,
        level: u32,
        levelmin: u32,
        levelmax: u32,
    },
    #[error("第 {index} 个单元的地址 {address:?} 超出层级 {level} 的范围")]
    InvalidAddress {
        index: usize,
        level: u32,
        address: [i64; 3],
    },
    #[error("第 {index} 个粒子的位置不是有限值")]
    NonFinitePosition { index: usize },
}

/// 数据集解析器 trait
/// 不同文件格式需要实现这个 trait
pub trait DatasetParser: Send + Sync {
    /// 支持的文件扩展名（不含开头的点号），可以是复合扩展名，例如 "json.gz"
    fn supported_extensions(&self) -> Vec<&'static str>;

    /// 读取并校验完整数据集
    fn parse_from_file(&self, file_path: &str) -> Result<Dataset, ParseError>;

    /// 只返回元数据与记录数，用于快速预览
    fn read_info_from_file(&self, file_path: &str) -> Result<DatasetInfo, ParseError> {
        self.parse_from_file(file_path).map(|d| d.describe())
    }

    /// 获取解析器名称（用于日志和错误信息）
    fn name(&self) -> &'static str;
}
