use crate::io_struct::ProcessRequest;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use actix_web::{HttpRequest, HttpResponse, HttpServer, get, post, web};
use serde_json::json;
use std::io::Write;

#[get("/health")]
pub async fn health(_req: HttpRequest, _: web::Data<Orchestrator>) -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

#[post("/process_image")]
pub async fn process_image(
    _req: HttpRequest,
    req: web::Json<ProcessRequest>,
    app_state: web::Data<Orchestrator>,
) -> HttpResponse {
    let resp = app_state.process(req.into_inner()).await;
    HttpResponse::Ok().json(resp)
}

#[get("/processing_status/{process_id}")]
pub async fn processing_status(
    path: web::Path<String>,
    app_state: web::Data<Orchestrator>,
) -> HttpResponse {
    HttpResponse::Ok().json(app_state.get_processing_status(&path.into_inner()))
}

#[get("/get_pools")]
pub async fn get_pools(_req: HttpRequest, app_state: web::Data<Orchestrator>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "pools": app_state.pool_snapshot() }))
}

#[get("/probe_workers")]
pub async fn probe_workers(
    _req: HttpRequest,
    app_state: web::Data<Orchestrator>,
) -> HttpResponse {
    let reports = app_state.probe_workers().await;
    let all_reachable = reports.iter().all(|r| r.reachable);
    HttpResponse::Ok().json(json!({
        "all_reachable": all_reachable,
        "workers": reports,
    }))
}

/// Registers every route on an actix app. Shared by `startup` and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(process_image)
        .service(processing_status)
        .service(get_pools)
        .service(probe_workers);
}

/// Logs pool dispatch and in-flight counters every `log_interval` seconds.
pub async fn periodic_logging(orchestrator: Orchestrator) {
    if orchestrator.log_interval == 0 {
        return futures::future::pending().await;
    }
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(orchestrator.log_interval)).await;
        for pool in orchestrator.pool_snapshot() {
            log::info!("Pool {}", pool);
        }
    }
}

/// Installs the global logger. `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
    let level = default_level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .init();
}

pub async fn startup(config: OrchestratorConfig, orchestrator: Orchestrator) -> std::io::Result<()> {
    for pool in orchestrator.pool_snapshot() {
        let addrs = pool
            .endpoints
            .iter()
            .map(|e| e.address.as_str())
            .collect::<Vec<_>>();
        log::info!(
            "{} instances: {} - [{}] ({})",
            pool.stage,
            addrs.len(),
            addrs.join(", "),
            pool.policy
        );
    }
    log::info!("Starting orchestrator at {}:{}", config.host, config.port);

    let app_state = web::Data::new(orchestrator);
    let payload_limit = config.max_payload_size;

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(payload_limit))
            .configure(configure)
    })
    .bind((config.host, config.port))?
    .run()
    .await?;

    std::io::Result::Ok(())
}
