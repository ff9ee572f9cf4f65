use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;

use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct RemapPayload {
    pub task_id: String,
    pub target_depth: u32,
}

/// 在已有结果上追加粗分辨率图
#[post("/projection/remap")]
pub async fn remap_projection(
    data: web::Data<AppState>,
    payload: web::Json<RemapPayload>,
) -> impl Responder {
    let Some(task) = data.task_store.get(&payload.task_id) else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "无效的 task_id",
            "task_id": payload.task_id,
        }));
    };

    let source = task.result.clone();
    let depth = payload.target_depth;
    let remapped = match web::block(move || amr_projector::remap(&source, depth)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "无法重映射",
                "task_id": payload.task_id,
                "target_depth": depth,
                "details": e.to_string(),
            }));
        }
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "重映射任务执行失败",
                "details": e.to_string(),
            }));
        }
    };

    let summary = remapped.summary();
    if !data.task_store.replace_result(&payload.task_id, remapped) {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "任务已过期",
            "task_id": payload.task_id,
        }));
    }
    HttpResponse::Ok().json(serde_json::json!({
        "task_id": payload.task_id,
        "summary": summary,
    }))
}
