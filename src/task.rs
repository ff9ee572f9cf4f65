use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::map_result::MapResult;

/// 一次投影的结果及其来源文件
pub struct TaskData {
    pub result: Arc<MapResult>,
    pub file: String,
    /// 任务创建时间，用于 TTL 过期检查；重映射不刷新
    pub created_at: Instant,
}

impl TaskData {
    pub fn new(result: MapResult, file: String) -> Self {
        Self {
            result: Arc::new(result),
            file,
            created_at: Instant::now(),
        }
    }
}

pub struct TaskStore {
    tasks: RwLock<HashMap<String, Arc<TaskData>>>,
    default_ttl: Duration,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(30 * 60))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            default_ttl: ttl,
        }
    }

    pub fn insert(&self, data: TaskData) -> String {
        let task_id = Uuid::new_v4().to_string();
        self.tasks.write().insert(task_id.clone(), Arc::new(data));
        task_id
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<TaskData>> {
        self.tasks.read().get(task_id).cloned()
    }

    /// 用重映射后的结果替换；任务已过期时返回 false
    pub fn replace_result(&self, task_id: &str, result: MapResult) -> bool {
        let mut tasks = self.tasks.write();
        let Some(existing) = tasks.get(task_id) else {
            return false;
        };
        let updated = TaskData {
            result: Arc::new(result),
            file: existing.file.clone(),
            created_at: existing.created_at,
        };
        tasks.insert(task_id.to_string(), Arc::new(updated));
        true
    }

    /// 清理过期的任务
    /// 返回清理的任务数量
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut tasks = self.tasks.write();
        let before_count = tasks.len();
        tasks.retain(|_, task| now.duration_since(task.created_at) < self.default_ttl);
        before_count - tasks.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
