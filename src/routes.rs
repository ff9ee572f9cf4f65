use actix_web::web;

use crate::handlers;

/// 统一注册 HTTP 路由，方便集中管理
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::hello)
        .service(handlers::create_projection)
        .service(handlers::remap_projection)
        .service(handlers::get_map)
        .service(handlers::get_performance);
}
