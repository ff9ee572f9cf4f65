use actix_web::{HttpResponse, Responder, get, web};
use amr_projector::Variable;

use crate::app_state::AppState;

/// 根路径健康检查/服务说明
#[get("/")]
pub async fn hello(data: web::Data<AppState>) -> impl Responder {
    let supported = data.parser_registry.supported_extensions();
    let variables: Vec<&str> = Variable::ALL.iter().map(|v| v.name()).collect();
    HttpResponse::Ok().json(serde_json::json!({
        "message": "AMR 投影服务",
        "endpoints": [
            "POST /projection",
            "POST /projection/remap",
            "GET /projection/map?task_id=<id>&variable=<name>[&depth=<L>]",
            "GET /performance?session_id=<task_id>",
        ],
        "supported_extensions": supported,
        "variables": variables,
        "resource_dir": data.resource_dir,
        "max_concurrency_cap": data.max_concurrency_cap,
        "active_tasks": data.task_store.task_count(),
    }))
}
