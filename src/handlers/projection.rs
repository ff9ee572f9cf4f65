use std::sync::Arc;

use actix_web::{HttpResponse, Responder, post, web};
use amr_projector::parser_registry::{ParserRegistry, RegistryError};
use amr_projector::parsers::DatasetInfo;
use amr_projector::task::TaskData;
use amr_projector::utils::parser::ParseError;
use amr_projector::{InvalidRequestError, MapResult, MapSummary, ProgressCallback, RequestSpec};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct ProjectionPayload {
    /// 资源目录下的文件名
    pub file: String,
    pub request: RequestSpec,
}

#[derive(Serialize)]
pub struct ProjectionResponse {
    pub task_id: String,
    pub file: String,
    pub dataset: DatasetInfo,
    pub summary: MapSummary,
}

#[derive(Debug, Error)]
enum ProjectionFailure {
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Invalid(#[from] InvalidRequestError),
}

impl ProjectionFailure {
    fn to_response(&self, file: &str) -> HttpResponse {
        match self {
            ProjectionFailure::Registry(RegistryError::UnsafePath(_)) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "文件路径必须是资源目录内的相对路径",
                    "file": file,
                }))
            }
            ProjectionFailure::Registry(RegistryError::Unsupported { supported, .. }) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "不支持的文件格式",
                    "file": file,
                    "supported_extensions": supported,
                }))
            }
            ProjectionFailure::Parse(ParseError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "文件不存在或无法访问",
                    "file": file,
                    "details": e.to_string(),
                }))
            }
            ProjectionFailure::Parse(e) => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "解析数据集失败",
                "file": file,
                "details": e.to_string(),
            })),
            ProjectionFailure::Invalid(e) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "投影请求无效",
                "details": e.to_string(),
            })),
        }
    }
}

/// 读取数据集并投影；在阻塞线程池上执行
fn run_projection(
    registry: &ParserRegistry,
    resource_dir: &str,
    file: &str,
    mut spec: RequestSpec,
    max_concurrency_cap: usize,
) -> Result<(DatasetInfo, MapResult), ProjectionFailure> {
    let resolved = registry.resolve_in(resource_dir, file)?;
    let file_path = resolved.path_str();
    let dataset = resolved.parser.parse_from_file(&file_path)?;
    info!(
        "[投影] {} 使用 {} 读取 {} 条{}记录",
        file_path,
        resolved.parser.name(),
        dataset.len(),
        dataset.kind()
    );

    if spec.max_concurrency > max_concurrency_cap {
        debug!(
            "[投影] 请求并发 {} 超过上限，截断为 {}",
            spec.max_concurrency, max_concurrency_cap
        );
        spec.max_concurrency = max_concurrency_cap;
    }
    let request = spec
        .into_builder()?
        .progress(ProgressCallback::new(|event| debug!("[投影] {:?}", event)))
        .build(dataset.info())?;
    let result = dataset.project(&request)?;
    Ok((dataset.describe(), result))
}

#[post("/projection")]
pub async fn create_projection(
    data: web::Data<AppState>,
    payload: web::Json<ProjectionPayload>,
) -> impl Responder {
    let ProjectionPayload { file, request } = payload.into_inner();
    let registry = Arc::clone(&data.parser_registry);
    let (resource_dir, target) = (data.resource_dir.clone(), file.clone());
    let cap = data.max_concurrency_cap;

    let outcome =
        web::block(move || run_projection(&registry, &resource_dir, &target, request, cap)).await;
    let (dataset, result) = match outcome {
        Ok(Ok(done)) => done,
        Ok(Err(failure)) => return failure.to_response(&file),
        Err(e) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "投影任务执行失败",
                "details": e.to_string(),
            }));
        }
    };

    let summary = result.summary();
    let timings = result.timings().to_vec();
    let task_id = data.task_store.insert(TaskData::new(result, file.clone()));
    data.performance_store.add_records(&task_id, timings);

    HttpResponse::Ok().json(ProjectionResponse {
        task_id,
        file,
        dataset,
        summary,
    })
}
