mod app_state;
mod config;
mod handlers;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use amr_projector::parser_registry::ParserRegistry;
use amr_projector::performance::PerformanceStore;
use amr_projector::task::TaskStore;
use log::{error, info};

use app_state::AppState;
use config::ServerConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::load().map_err(|e| {
        error!("加载配置失败: {}", e);
        std::io::Error::other(e)
    })?;

    // 初始化解析器注册表
    let parser_registry = Arc::new(ParserRegistry::new());
    info!("已注册的解析器:");
    for ext in parser_registry.supported_extensions() {
        info!("  - .{}", ext);
    }

    let ttl = Duration::from_secs(config.task_ttl_secs);
    let task_store = Arc::new(TaskStore::with_ttl(ttl));
    let performance_store = Arc::new(PerformanceStore::with_ttl(ttl));
    let app_state = web::Data::new(AppState {
        parser_registry,
        resource_dir: config.resource_dir.clone(),
        task_store: task_store.clone(),
        performance_store: performance_store.clone(),
        max_concurrency_cap: config.max_concurrency_cap,
    });

    // 后台定期清理过期的任务与性能记录
    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs);
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let cleaned = task_store.cleanup_expired();
            let sessions = performance_store.cleanup_expired();
            if cleaned > 0 || sessions > 0 {
                info!(
                    "[清理任务] 清理了 {} 个过期任务、{} 个性能会话，当前剩余: {} 个任务",
                    cleaned,
                    sessions,
                    task_store.task_count()
                );
            }
        }
    });

    info!("服务器启动在 http://{}:{}", config.host, config.port);
    info!("资源目录: {}", config.resource_dir);
    info!("任务 TTL: {} 分钟", ttl.as_secs() / 60);
    info!("单请求并发上限: {}", config.max_concurrency_cap);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
