use std::sync::Arc;

use amr_projector::parser_registry::ParserRegistry;
use amr_projector::performance::PerformanceStore;
use amr_projector::task::TaskStore;

/// 全局应用状态，负责在各个 handler 之间共享解析器、任务与资源目录
pub struct AppState {
    pub parser_registry: Arc<ParserRegistry>,
    pub resource_dir: String,
    pub task_store: Arc<TaskStore>,
    pub performance_store: Arc<PerformanceStore>,
    /// 单个请求的并发上限
    pub max_concurrency_cap: usize,
}
