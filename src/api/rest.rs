use crate::config::ApiConfig;
use crate::db::DatabaseService;
use crate::error::Error;
use crate::messaging::client::ClientTransport;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::info;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use super::websocket::handle_ws_upgrade;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<ClientTransport>,
    pub db: Arc<DatabaseService>,
    pub energy_threshold: f64,
    pub viewer_log_dir: PathBuf,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidPayload(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub database: bool,
    pub clients: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    pub energy_threshold: f64,
    pub viewer_log_dir: String,
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            config: config.clone(),
            state,
        }
    }

    pub fn router(&self) -> Router {
        // Create a CORS layer that allows all origins and preflight requests
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(false)
            .max_age(Duration::from_secs(3600));

        Router::new()
            .route("/ws", get(handle_ws_upgrade))
            .route("/api", get(liveness))
            .route("/api/health", get(health))
            .route("/api/config", get(dashboard_config))
            .with_state(self.state.clone())
            // Everything else is the dashboard itself
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(cors)
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

        info!("API server listening on {}", addr);
        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn liveness() -> &'static str {
    "OK"
}

async fn health(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<HealthReport>)> {
    let database = state.db.health_check().await?;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((
        status,
        Json(HealthReport {
            database,
            clients: state.transport.session_count().await,
        }),
    ))
}

async fn dashboard_config(State(state): State<AppState>) -> Json<DashboardConfig> {
    Json(DashboardConfig {
        energy_threshold: state.energy_threshold,
        viewer_log_dir: state.viewer_log_dir.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_follows_error_kind() {
        let missing: ApiError = Error::NotFound("event".to_string()).into();
        assert_eq!(missing.status, 404);

        let wrapped: ApiError = anyhow::Error::from(Error::InvalidPayload("page".to_string())).into();
        assert_eq!(wrapped.status, 400);

        let other: ApiError = anyhow::anyhow!("boom").into();
        assert_eq!(other.status, 500);
    }

    #[test]
    fn test_dashboard_config_is_camel_case() {
        let config = DashboardConfig {
            energy_threshold: 2.5,
            viewer_log_dir: "./log/viewer".to_string(),
        };
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            serde_json::json!({"energyThreshold": 2.5, "viewerLogDir": "./log/viewer"})
        );
    }
}
