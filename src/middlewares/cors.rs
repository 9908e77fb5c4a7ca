use actix_cors::Cors;

pub fn create_cors() -> Cors {
    Cors::default()
        // 调用方是机器人网关和管理后台，来源不固定
        .allowed_origin_fn(|_, _req_head| true)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_any_header()
        .max_age(3600)
}
