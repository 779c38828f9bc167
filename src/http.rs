#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{get, post, web, App, HttpResponse, HttpServer};
use serde_json::json;
use tracing::{error, info};

use crate::service::Controller;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
}

#[get("/healthz")]
pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status":"ok"}))
}

#[get("/status")]
pub async fn resource_status(data: web::Data<AppState>) -> HttpResponse {
    let ctrl = &data.controller;
    HttpResponse::Ok().json(json!({
        "phase": ctrl.phase(),
        "started_at": ctrl.started_at(),
        "launched": ctrl.launched(),
        "resources": ctrl.status(),
    }))
}

#[post("/stop")]
pub async fn stop(data: web::Data<AppState>) -> HttpResponse {
    let already = data.controller.is_cancelled();
    data.controller.stop();
    info!(already, "stop via http");
    HttpResponse::Ok().json(json!({"status":"ok","already_stopping":already}))
}

#[get("/metrics")]
pub async fn scrape_metrics(data: web::Data<AppState>) -> HttpResponse {
    match data.controller.metrics().encode_text() {
        Ok(buf) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buf),
        Err(e) => {
            error!(error=%format!("{e:#}"), "encode metrics failed");
            HttpResponse::InternalServerError().body("encode metrics failed")
        }
    }
}

/// Builds the control surface on an already bound listener. The returned
/// server does nothing until polled; spawn it and keep its
/// [`handle`](Server::handle) to stop it.
pub fn serve(listener: TcpListener, controller: Arc<Controller>) -> std::io::Result<Server> {
    let state = AppState { controller };
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(healthz)
            .service(resource_status)
            .service(stop)
            .service(scrape_metrics)
    })
    .workers(1)
    .disable_signals()
    .listen(listener)?;
    info!(addrs = ?server.addrs(), "http surface listening");
    Ok(server.run())
}
