//! tether: runs the demo shop behind a request-to-job bridge.
//!
//! ```bash
//! tether demo                       # in-process requests, responses printed
//! tether serve --addr 127.0.0.1:3000
//! tether --config bridge.json serve
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use tether_core::app::{Bridge, BridgeSettings, QueueOptions, WorkerPool};
use tether_core::domain::RetryDirective;
use tether_core::error::PipelineError;
use tether_core::pipeline::{Context, Endpoint, Middleware, Next, Pipeline, ReplayContext, Request};

/// Largest request body `serve` accepts.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "tether", about = "Request-to-job replay bridge")]
struct Cli {
    /// Bridge settings as JSON; defaults apply when omitted.
    #[arg(long, env = "TETHER_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a few requests through an in-process bridge and print the responses.
    Demo,
    /// Serve the shop routes over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
}

#[derive(Debug, Deserialize)]
struct NewOrder {
    item: String,
    #[serde(default = "one")]
    quantity: u32,
}

fn one() -> u32 {
    1
}

/// Demo business logic. Runs on workers, never on the accepting side.
struct Shop;

#[async_trait]
impl Endpoint for Shop {
    async fn call(&self, cx: &mut Context) -> Result<(), PipelineError> {
        let attempt = cx.replay().map(ReplayContext::attempt).unwrap_or(0);

        match cx.request.path() {
            "/orders" => {
                let order: NewOrder = serde_json::from_str(cx.request.body())
                    .map_err(|err| {
                        PipelineError::bad_request(format!("invalid order: {err}"))
                            .with_retry(RetryDirective::Enabled(false))
                    })?;
                cx.response.set_status(StatusCode::CREATED);
                cx.response
                    .set_header("content-type", "application/json")
                    .map_err(|err| PipelineError::new(err.to_string()))?;
                cx.response.set_body(
                    serde_json::json!({ "item": order.item, "quantity": order.quantity })
                        .to_string(),
                );
            }
            "/flaky" => {
                if attempt < 2 {
                    return Err(PipelineError::new(format!("warming up (attempt {attempt})")));
                }
                cx.response.set_body(format!("ready after {attempt} attempts"));
            }
            "/reject" => {
                return Err(PipelineError::bad_request("rejected for good")
                    .with_retry(RetryDirective::Enabled(false)));
            }
            "/slow" => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                cx.response.set_body("finally");
            }
            _ => {
                return Err(PipelineError::new("no such route")
                    .with_status(StatusCode::NOT_FOUND)
                    .with_retry(RetryDirective::Enabled(false)));
            }
        }
        Ok(())
    }
}

/// Logs every pass through the pipeline, live or replayed.
struct AccessLog;

#[async_trait]
impl Middleware for AccessLog {
    async fn handle(&self, cx: &mut Context, next: Next<'_>) -> Result<(), PipelineError> {
        let method = cx.request.method().clone();
        let path = cx.request.path().to_string();
        let job_id = cx.replay().map(|replay| replay.job_id().to_string());

        let result = next.run(cx).await;

        tracing::info!(
            %method,
            %path,
            job_id = job_id.as_deref().unwrap_or("-"),
            status = %cx.response.effective_status(),
            ok = result.is_ok(),
            "handled"
        );
        result
    }
}

struct Service {
    bridge: Bridge,
    pipeline: Arc<Pipeline>,
    workers: WorkerPool,
}

impl Service {
    async fn start(settings: &BridgeSettings) -> Result<Self, Box<dyn Error>> {
        let bridge = Bridge::builder().settings(settings).build()?;
        let queue = bridge.queue("shop", QueueOptions::new()).await?;
        let pipeline = Arc::new(Pipeline::new(Shop).layer(AccessLog).layer(queue));
        let workers = WorkerPool::start(&bridge, Arc::clone(&pipeline), settings.workers).await;

        tracing::info!(bridge = %bridge.id(), workers = settings.workers, "service started");
        Ok(Self {
            bridge,
            pipeline,
            workers,
        })
    }

    async fn stop(self) {
        self.workers.shutdown_and_join().await;
        self.bridge.close().await;
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<BridgeSettings, Box<dyn Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(BridgeSettings::from_json(&raw)?)
        }
        None => Ok(BridgeSettings::default()),
    }
}

async fn demo(service: &Service) {
    let requests = [
        Request::post("/orders").with_body(r#"{"item":"tea","quantity":2}"#),
        Request::post("/orders").with_body("not json"),
        Request::get("/flaky"),
        Request::get("/reject"),
    ];

    for request in requests {
        let line = format!("{} {}", request.method(), request.url());
        let cx = service.pipeline.handle(request).await;
        println!(
            "{line} -> {} {}",
            cx.response.effective_status(),
            cx.response.body().unwrap_or("")
        );
    }
}

async fn handle_http(
    State(pipeline): State<Arc<Pipeline>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "unreadable request body");
            let mut response = axum::response::Response::new(Body::from("unreadable body"));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };

    let request = Request::from_http(axum::http::Request::from_parts(parts, bytes), false);
    let cx = pipeline.handle(request).await;
    cx.response.into_http().map(Body::from)
}

async fn serve(service: &Service, addr: SocketAddr) -> Result<(), Box<dyn Error>> {
    let app = Router::new()
        .fallback(handle_http)
        .with_state(Arc::clone(&service.pipeline));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;
    let service = Service::start(&settings).await?;

    let result = match cli.command {
        Command::Demo => {
            demo(&service).await;
            Ok(())
        }
        Command::Serve { addr } => serve(&service, addr).await,
    };

    service.stop().await;
    result
}
