use actix_web::{HttpResponse, Responder, get, http::header::ContentType, web};
use amr_projector::Variable;
use serde::Deserialize;

use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct MapQuery {
    pub task_id: String,
    pub variable: String,
    /// 缺省为原分辨率；否则为已重映射的层级
    pub depth: Option<u32>,
}

/// 以小端 f64 二进制返回一个变量的图
#[get("/projection/map")]
pub async fn get_map(data: web::Data<AppState>, query: web::Query<MapQuery>) -> impl Responder {
    let Some(task) = data.task_store.get(&query.task_id) else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "无效的 task_id",
            "task_id": query.task_id,
        }));
    };
    let variable: Variable = match query.variable.parse() {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "无效的变量名",
                "details": e.to_string(),
            }));
        }
    };

    let result = &task.result;
    if let Some(err) = result.error(variable) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "该变量计算失败",
            "variable": variable,
            "details": err.to_string(),
        }));
    }

    let grid = match query.depth {
        Some(d) if Some(d) != result.effective_depth() => match result.coarse(d) {
            Some(coarse) => &coarse.grid,
            None => {
                return HttpResponse::NotFound().json(serde_json::json!({
                    "error": "该层级尚未重映射",
                    "depth": d,
                }));
            }
        },
        _ => result.grid(),
    };

    let bytes = match result.map_le_bytes(variable, query.depth) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "结果中没有该变量",
                "variable": variable,
            }));
        }
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "写入图数据失败",
                "details": e.to_string(),
            }));
        }
    };

    HttpResponse::Ok()
        .content_type(ContentType::octet_stream())
        .append_header(("X-Map-Variable", variable.name()))
        .append_header(("X-Map-Unit", result.unit(variable).unwrap_or_default().to_string()))
        .append_header(("X-Map-Width", grid.nx.to_string()))
        .append_header(("X-Map-Height", grid.ny.to_string()))
        .append_header((
            "X-Map-Depth",
            grid.depth.map(|d| d.to_string()).unwrap_or_default(),
        ))
        .append_header(("X-Map-Task", query.task_id.clone()))
        .body(bytes)
}
