use actix_web::{HttpResponse, Responder, get, web};
use log::debug;
use serde::Deserialize;

use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct PerformanceQuery {
    pub session_id: String,
}

/// 获取指定任务各工作线程的执行记录
#[get("/performance")]
pub async fn get_performance(
    data: web::Data<AppState>,
    query: web::Query<PerformanceQuery>,
) -> impl Responder {
    let records = data.performance_store.get_records(&query.session_id);
    debug!(
        "[性能数据查询] session_id: {}, 记录数: {}",
        query.session_id,
        records.as_ref().map_or(0, |r| r.len())
    );

    // 没有记录时返回空数组而不是 404：任务可能已过期
    HttpResponse::Ok().json(serde_json::json!({
        "session_id": query.session_id,
        "records": records.unwrap_or_default(),
    }))
}
