//! 路由定义
//!
//! 集中管理所有 API 路由，将路径映射到对应的 handlers。
//! 管理接口统一挂在 /api 下：
//! - 模拟：/simulation/*（含生命周期、批量开通与设备配置）
//! - 目标平台：/target/*（含目标设备与模型关联）
//! - 设备模型：/model/*
//! - 健康检查与指标：/health, /metrics（/health 同时挂在根路径）
//!
//! 集合路径上的 PUT 从请求体读取 ID，其余 PUT 以路径 ID 为准。

use super::AppState;
use super::handlers::*;
use super::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// 创建 API 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/simulation", get(list_simulations).put(put_simulation))
        .route(
            "/simulation/:simulation_id",
            get(get_simulation)
                .put(upsert_simulation)
                .delete(delete_simulation),
        )
        .route("/simulation/:simulation_id/start", post(start_simulation))
        .route("/simulation/:simulation_id/stop", post(stop_simulation))
        .route(
            "/simulation/:simulation_id/devices",
            get(list_device_statuses),
        )
        .route(
            "/simulation/:simulation_id/provision",
            axum::routing::delete(delete_all_devices),
        )
        .route(
            "/simulation/:simulation_id/provision/:model_id/:num_devices",
            post(provision_devices).delete(delete_devices),
        )
        .route(
            "/simulation/:simulation_id/deviceConfig",
            get(list_device_configs)
                .put(create_device_config)
                .delete(delete_all_device_configs),
        )
        .route(
            "/simulation/:simulation_id/deviceConfig/:config_id",
            get(get_device_config)
                .put(upsert_device_config)
                .delete(delete_device_config),
        )
        .route("/target", get(list_targets).put(put_target))
        .route(
            "/target/:target_id",
            get(get_target).put(upsert_target).delete(delete_target),
        )
        .route(
            "/target/:target_id/models",
            get(list_target_models)
                .put(set_target_models)
                .delete(clear_target_models),
        )
        .route(
            "/target/:target_id/device",
            get(list_target_devices)
                .put(put_target_device)
                .delete(delete_all_target_devices),
        )
        .route(
            "/target/:target_id/device/:device_id",
            get(get_target_device)
                .put(upsert_target_device)
                .delete(delete_target_device),
        )
        .route("/model", get(list_models).put(put_model))
        .route(
            "/model/:model_id",
            get(get_model).put(upsert_model).delete(delete_model),
        )
}

/// 组装完整应用：/api 前缀、根路径健康检查、请求追踪与 request_id 注入
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", create_api_router())
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use domain::SimulationSettings;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use starling_protocol::LoopbackProtocol;
    use starling_simulation::Controller;
    use starling_storage::Stores;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        let controller = Arc::new(Controller::new(
            Stores::in_memory(),
            Arc::new(LoopbackProtocol::new()),
            SimulationSettings::default(),
        ));
        create_app(AppState::new(controller))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn seed(app: &Router) {
        let (status, _) = send(
            app,
            "PUT",
            "/api/model/thermo",
            Some(json!({
                "name": "Thermostat",
                "components": [{
                    "name": "main",
                    "telemetry": [
                        {"name": "temp", "schema": "double"},
                        {"name": "humidity", "schema": "integer"}
                    ],
                    "properties": [{"name": "serial", "schema": "string"}]
                }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            app,
            "PUT",
            "/api/target/t1",
            Some(json!({
                "provisioningEndpoint": "dps.example.net",
                "dataEndpoint": "hub.example.net",
                "sharedAccessKey": "c2VjcmV0",
                "modelIds": ["thermo"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            app,
            "PUT",
            "/api/simulation/sim1",
            Some(json!({"name": "smoke", "targetId": "t1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_served_at_root_and_under_api() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));

        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn simulation_lifecycle_over_http() {
        let app = create_test_app();
        seed(&app).await;

        let (status, body) = send(&app, "GET", "/api/model/thermo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["telemetryCount"], 2);

        let (status, body) = send(&app, "POST", "/api/simulation/sim1/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "running");

        let (status, body) = send(
            &app,
            "POST",
            "/api/simulation/sim1/provision/thermo/2",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["deviceIds"],
            json!(["sim1-t1-thermo-0001", "sim1-t1-thermo-0002"])
        );

        let (status, body) = send(&app, "GET", "/api/simulation/sim1/devices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

        let (status, body) = send(&app, "POST", "/api/simulation/sim1/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "stopped");

        let (status, body) = send(&app, "GET", "/api/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["runningSimulations"], 0);
    }

    #[tokio::test]
    async fn errors_use_the_response_envelope() {
        let app = create_test_app();
        seed(&app).await;

        let (status, body) = send(&app, "GET", "/api/simulation/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "RESOURCE.NOT_FOUND");

        let (status, body) = send(&app, "POST", "/api/simulation/sim1/stop", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SIMULATION.CONFLICT");

        let (status, body) = send(
            &app,
            "POST",
            "/api/simulation/sim1/provision/thermo/zero",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID.REQUEST");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/simulation/sim2",
            Some(json!({"targetId": "nowhere"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn running_simulation_locks_its_target() {
        let app = create_test_app();
        seed(&app).await;

        let (status, _) = send(&app, "POST", "/api/simulation/sim1/start", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "DELETE", "/api/target/t1", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(&app, "DELETE", "/api/simulation/sim1", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(
            &app,
            "PUT",
            "/api/simulation/sim1",
            Some(json!({"targetId": "t1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "POST", "/api/simulation/sim1/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", "/api/simulation/sim1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", "/api/target/t1", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn target_resources_hide_the_shared_key() {
        let app = create_test_app();
        seed(&app).await;

        let (status, body) = send(&app, "GET", "/api/target/t1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["hasSharedAccessKey"], true);
        assert!(body["data"].get("sharedAccessKey").is_none());

        let (status, body) = send(&app, "GET", "/api/target/t1/models", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], "thermo");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/target/t1/models",
            Some(json!({"modelIds": ["ghost"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/target/t1/device/dev-1",
            Some(json!({"simulationId": "sim1", "modelId": "thermo"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["registered"], false);

        let (status, body) = send(&app, "DELETE", "/api/target/t1/device", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], 1);
    }

    #[tokio::test]
    async fn device_configs_fill_defaults() {
        let app = create_test_app();
        seed(&app).await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/simulation/sim1/deviceConfig/cfg-1",
            Some(json!({"modelId": "thermo", "telemetryIntervalMs": 500})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["telemetryIntervalMs"], 500);
        assert_eq!(body["data"]["reportedPropertiesIntervalMs"], 300_000);

        let (status, body) = send(&app, "GET", "/api/simulation/sim1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["targetId"], "t1");
        assert_eq!(body["data"]["deviceConfigs"][0]["id"], "cfg-1");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/simulation/sim1/deviceConfig/cfg-2",
            Some(json!({"modelId": "thermo", "telemetryIntervalMs": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "DELETE", "/api/simulation/sim1/deviceConfig", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], 1);
    }

    #[tokio::test]
    async fn collection_puts_take_the_id_from_the_body() {
        let app = create_test_app();

        let (status, body) = send(
            &app,
            "PUT",
            "/api/model",
            Some(json!({
                "id": "meter",
                "components": [{
                    "name": "main",
                    "telemetry": [{"name": "kwh", "schema": "double"}]
                }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "meter");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/target",
            Some(json!({
                "id": "t2",
                "provisioningEndpoint": "dps.example.net",
                "dataEndpoint": "hub.example.net",
                "modelIds": ["meter"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "t2");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/simulation",
            Some(json!({"id": "sim2", "targetId": "t2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "sim2");
        let (status, _) = send(&app, "GET", "/api/simulation/sim2", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/target/t2/device",
            Some(json!({"deviceId": "dev-9", "simulationId": "sim2", "modelId": "meter"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deviceId"], "dev-9");
        let (status, _) = send(&app, "GET", "/api/target/t2/device/dev-9", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn body_ids_must_be_present_and_match_the_path() {
        let app = create_test_app();
        seed(&app).await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/simulation",
            Some(json!({"targetId": "t1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID.REQUEST");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/target/t1",
            Some(json!({
                "id": "t9",
                "provisioningEndpoint": "dps.example.net",
                "dataEndpoint": "hub.example.net"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/model",
            Some(json!({"components": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/target/t1/device",
            Some(json!({"simulationId": "sim1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/target/t9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
