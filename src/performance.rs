use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// 一个变量在某个工作槽位上的执行记录
///
/// 字段沿用前端时间线的约定：同一 `channel_group` 颜色相同，
/// `channel_index` 区分行 (这里是工作槽位，如 "worker_0")。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// 开始时间 (Unix 时间戳，毫秒)
    pub start_time: u64,
    /// 结束时间 (Unix 时间戳，毫秒)
    pub end_time: u64,
    /// 本次投影的 run_id
    pub channel_group: String,
    pub channel_index: String,
    pub variable: String,
    /// 参与累加的记录数
    pub records_binned: usize,
    pub ok: bool,
    /// hover 时显示的信息
    pub msg: String,
}

/// 按会话 (任务 id) 保存性能记录，带 TTL
pub struct PerformanceStore {
    records: RwLock<HashMap<String, (Instant, Vec<PerformanceRecord>)>>,
    default_ttl: Duration,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(30 * 60))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            default_ttl: ttl,
        }
    }

    /// 批量追加；会话第一次出现时记录创建时间
    pub fn add_records(&self, session_id: &str, records: Vec<PerformanceRecord>) {
        let mut all = self.records.write();
        let entry = all
            .entry(session_id.to_string())
            .or_insert_with(|| (Instant::now(), Vec::new()));
        entry.1.extend(records);
    }

    pub fn get_records(&self, session_id: &str) -> Option<Vec<PerformanceRecord>> {
        self.records.read().get(session_id).map(|(_, r)| r.clone())
    }

    /// 清理过期会话，返回清理数量
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut all = self.records.write();
        let before = all.len();
        all.retain(|_, (created_at, _)| now.duration_since(*created_at) < self.default_ttl);
        before - all.len()
    }
}

impl Default for PerformanceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Unix 时间戳（毫秒）
pub fn get_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
