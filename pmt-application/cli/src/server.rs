//! HTTP 状态服务
//!
//! 对外暴露迁移的受理与观测接口，前端轮询 `/api/migration-status`
//! 获取进度。同一时间只受理一个迁移，重复提交返回 409。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pmt_migration::{MigrationError, MigrationRequest, MigrationService};
use pmt_progress::MigrationStatus;

use crate::config::CliConfig;

/// 以配置文件里的集群登记启动 HTTP 服务
pub async fn run(bind: SocketAddr) -> Result<()> {
    let config = CliConfig::load()?;
    if config.clusters.is_empty() {
        tracing::warn!("配置文件里没有登记任何集群，先执行 pmt cluster add");
    } else {
        info!("已登记 {} 个集群", config.clusters.len());
    }

    let service = Arc::new(MigrationService::new(config.to_registry().into_shared()));
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("无法监听 {}", bind))?;
    info!("✅ PMT 迁移服务监听 http://{}", bind);
    axum::serve(listener, app).await.context("HTTP 服务异常退出")?;

    Ok(())
}

fn router(service: Arc<MigrationService>) -> Router {
    Router::new()
        .route("/api/migrate", post(start_migration))
        .route("/api/migration-status", get(migration_status))
        .route("/api/confirm-vm-stop", post(confirm_vm_stop))
        .route("/api/cancel-migration", post(cancel_migration))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(service)
}

/// 受理迁移请求，后台推进，立即返回
async fn start_migration(
    State(service): State<Arc<MigrationService>>,
    Json(request): Json<MigrationRequest>,
) -> impl IntoResponse {
    match service.start(request).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({"status": "success", "message": "迁移已受理"})),
        ),
        Err(err) => {
            let code = match err {
                MigrationError::Busy => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            (code, Json(json!({"status": "error", "message": err.to_string()})))
        }
    }
}

/// 当前迁移状态快照
async fn migration_status(
    State(service): State<Arc<MigrationService>>,
) -> Json<MigrationStatus> {
    Json(service.status().await)
}

/// 用户确认停止源虚拟机
async fn confirm_vm_stop(State(service): State<Arc<MigrationService>>) -> impl IntoResponse {
    if service.confirm_stop().await {
        (
            StatusCode::OK,
            Json(json!({"status": "success", "message": "已确认停止源虚拟机"})),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "没有进行中的迁移"})),
        )
    }
}

/// 取消当前迁移
async fn cancel_migration(State(service): State<Arc<MigrationService>>) -> impl IntoResponse {
    if service.cancel().await {
        (
            StatusCode::OK,
            Json(json!({"status": "success", "message": "迁移已取消"})),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "没有进行中的迁移"})),
        )
    }
}

/// 容器健康检查
async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "version": env!("CARGO_PKG_VERSION")}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use pmt_common::StaticRegistry;

    fn service() -> Arc<MigrationService> {
        Arc::new(MigrationService::new(StaticRegistry::new().into_shared()))
    }

    fn request() -> MigrationRequest {
        MigrationRequest {
            source_cluster_id: "cluster-a".to_string(),
            dest_cluster_id: "cluster-b".to_string(),
            vmid: 100,
            source_node: "pve1".to_string(),
            dest_node: "pve2".to_string(),
            storage_mappings: HashMap::from([("scsi0".to_string(), "local".to_string())]),
            network_mappings: None,
            dest_storage: None,
            delete_source: false,
        }
    }

    #[tokio::test]
    async fn test_migrate_accepted_then_busy() {
        let service = service();

        let resp = start_migration(State(service.clone()), Json(request()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        // 第一个任务还在后台，重复提交返回 409
        let resp = start_migration(State(service.clone()), Json(request()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_status_snapshot_shape() {
        let service = service();
        let Json(status) = migration_status(State(service)).await;
        assert!(!status.active);
        assert_eq!(status.progress, 0.0);
    }

    #[tokio::test]
    async fn test_confirm_and_cancel_without_migration() {
        let service = service();

        let resp = confirm_vm_stop(State(service.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = cancel_migration(State(service)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
