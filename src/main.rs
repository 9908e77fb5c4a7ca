use actix_web::{App, HttpServer, middleware::Logger, web};
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use chrono::Local;  // timestamp in log lines
use std::sync::Arc;

use raffle_backend::{
    config::Config,
    database::build_store,
    external::WebhookNotifier,
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 存储引擎（连接数据库并运行迁移）
    let store = build_store(&config.database)
        .await
        .expect("Failed to initialize activity store");

    // 创建JWT服务
    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.access_token_expires_in);

    // 通知：日志 + 可选的 webhook
    let mut notifier = CompositeNotifier::new().with(Arc::new(LogNotifier));
    if let Some(url) = config.notify.webhook_url.as_deref() {
        match WebhookNotifier::new(url, config.notify.timeout_secs) {
            Ok(webhook) => {
                log::info!("Raffle events will be posted to {url}");
                notifier = notifier.with(Arc::new(webhook));
            }
            Err(e) => log::error!("Failed to create webhook notifier: {e:?}"),
        }
    }

    // 调度器与服务
    let scheduler = DrawScheduler::new(store.clone(), Arc::new(notifier), config.scheduler.clone());
    let raffle_service = RaffleService::new(store, scheduler.clone());

    // 重建定时器，停机期间已到期的活动立即开奖
    match scheduler.recover_on_startup().await {
        Ok(report) if report.failed > 0 => {
            log::error!("{} activities failed to draw during recovery", report.failed)
        }
        Ok(_) => {}
        Err(e) => log::error!("Scheduler recovery failed: {e:?}"),
    }

    tasks::spawn_all(
        scheduler.clone(),
        std::time::Duration::from_secs(config.scheduler.sweep_interval_secs),
    );

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let result = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors())
            .app_data(web::Data::new(raffle_service.clone()))
            .configure(swagger_config)
            .service(web::scope("/api/v1").configure(handlers::raffle_config))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await;

    // 停机：丢弃所有定时器，重启后由 recover_on_startup 重建
    scheduler.clear_all().await;
    log::info!("Server stopped");

    result
}
