use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};

use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::ml::ModelInfo;
use crate::response::PredictionResponse;
use crate::samples;
use crate::service::PredictionService;
use crate::types::timestamp_now;

const SERVER_NAME: &str = "Tabular Model Prediction Server";

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<PredictionService>,
}

#[derive(Debug, Serialize)]
struct RootResponse {
    status: &'static str,
    server: &'static str,
    model_loaded: bool,
    model_type: String,
    timestamp: String,
    endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
struct Endpoints {
    health: &'static str,
    model_info: &'static str,
    predict: &'static str,
    test: &'static str,
    test_raw: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    model_loaded: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ServiceError::InvalidInput(_) => warn!("[API] Rejected request: {}", self),
            _ => error!("[API] {}", self),
        }
        error_response(status, self.to_string())
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: ApiState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(root).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .route("/model-info", get(model_info).fallback(method_not_allowed))
        .route("/predict", post(predict).fallback(method_not_allowed))
        .route(
            "/test-prediction",
            post(test_prediction).fallback(method_not_allowed),
        )
        .route("/test-raw", post(test_raw).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CatchPanicLayer::custom(internal_error))
        .layer(cors_layer(config))
}

pub async fn serve<F>(
    config: ServerConfig,
    state: ApiState,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, &config);

    let addr: SocketAddr = config.api_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[API] Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn root(State(state): State<ApiState>) -> Json<RootResponse> {
    let model_type = state
        .service
        .model()
        .map(|handle| handle.model_type().to_string())
        .unwrap_or_else(|| "None".to_string());

    Json(RootResponse {
        status: "running",
        server: SERVER_NAME,
        model_loaded: state.service.is_loaded(),
        model_type,
        timestamp: timestamp_now(),
        endpoints: Endpoints {
            health: "/health",
            model_info: "/model-info",
            predict: "/predict",
            test: "/test-prediction",
            test_raw: "/test-raw",
        },
    })
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: timestamp_now(),
        model_loaded: state.service.is_loaded(),
    })
}

async fn model_info(State(state): State<ApiState>) -> Result<Json<ModelInfo>, Response> {
    match state.service.model() {
        Some(handle) => Ok(Json(handle.info())),
        None => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No model loaded",
        )),
    }
}

async fn predict(
    State(state): State<ApiState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !state.service.is_loaded() {
        return ServiceError::ModelUnavailable.into_response();
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("[API] Rejected request body: {}", rejection.body_text());
            return error_response(
                rejection.status(),
                format!("Invalid request body: {}", rejection.body_text()),
            );
        }
    };

    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("[API] Unparseable body ({} bytes): {}", body.len(), err);
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid JSON payload: {}", err),
                );
            }
        }
    };

    state
        .service
        .predict_records(payload.as_ref())
        .map(Json)
        .into_response()
}

async fn test_prediction(
    State(state): State<ApiState>,
) -> Result<Json<PredictionResponse>, ServiceError> {
    let body = Value::Array(
        samples::test_records()
            .into_iter()
            .map(Value::Object)
            .collect(),
    );
    state.service.predict_records(Some(&body)).map(Json)
}

async fn test_raw(State(state): State<ApiState>) -> Result<Json<PredictionResponse>, ServiceError> {
    state
        .service
        .predict_raw(samples::raw_records(), &samples::raw_feature_order())
        .map(Json)
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Endpoint not found")
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn internal_error(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("[API] Handler panicked: {}", detail);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = if config.allows_any_origin() {
        CorsLayer::new().allow_origin(AnyOrigin)
    } else {
        let origins = config
            .cors_origin_list()
            .iter()
            .filter_map(|origin| origin.parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::error::PredictionError;
    use crate::ml::artifact::{BuiltModel, ModelArtifact};
    use crate::ml::estimator::Estimator;
    use crate::ml::{ModelHandle, ModelState};
    use crate::types::Label;

    const CO2_MODEL: &str = r#"{
        "feature_names": [
            "Depth (m)", "P (MPa)", "T (°C)", "CO2 Density (kg/m3)", "GIIP (Mt)",
            "Seal Thickness (m)", "Reservoir Thickness (m)", "Fault", "Stacked"
        ],
        "estimator": {
            "kind": "pipeline",
            "steps": [
                ["scaler", {"kind": "standard_scaler",
                            "mean": [2000, 20, 50, 500, 10000, 200, 200, 0.5, 0.5],
                            "scale": [1000, 15, 25, 300, 5000, 100, 100, 0.5, 0.5]}],
                ["classifier", {"kind": "logistic_regression", "classes": [0, 1],
                                "coefficients": [[0.8, 0.3, 0.1, 0.9, 0.2, 0.4, 0.3, -0.6, 0.2]],
                                "intercepts": [-0.1]}]
            ]
        }
    }"#;

    fn loaded_app() -> Router {
        let model = ModelArtifact::from_slice(CO2_MODEL.as_bytes())
            .unwrap()
            .build()
            .unwrap();
        let handle = ModelHandle::new(model, "model.json", timestamp_now());
        app(PredictionService::new(ModelState::Loaded(handle)))
    }

    fn absent_app() -> Router {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig::default();
        app(PredictionService::load(dir.path(), &config.model_files))
    }

    fn app(service: PredictionService) -> Router {
        let state = ApiState {
            service: Arc::new(service),
        };
        router(state, &ServerConfig::default())
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.unwrap_or_default().to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn full_record() -> Value {
        json!({
            "Depth (m)": 465,
            "P (MPa)": 4.5,
            "T (°C)": 20,
            "CO2 Density (kg/m3)": 116.9,
            "GIIP (Mt)": 10059.38824,
            "Seal Thickness (m)": 300,
            "Reservoir Thickness (m)": 108.6962682,
            "Fault": 0,
            "Stacked": 0
        })
    }

    #[tokio::test]
    async fn test_predict_single_record() {
        let body = json!([full_record()]).to_string();
        let (status, json) = call(loaded_app(), "POST", "/predict", Some(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], json!(true));
        assert_eq!(json["total_records"], json!(1));

        let record = json["predictions"][0].as_object().unwrap();
        assert_eq!(record.len(), 12);
        for (key, value) in full_record().as_object().unwrap() {
            assert_eq!(record.get(key), Some(value));
        }
        assert!(record.contains_key("prediction"));
        assert!(record.contains_key("probability_0"));
        assert!(record.contains_key("probability_1"));
    }

    #[tokio::test]
    async fn test_predict_empty_list() {
        let (status, json) = call(loaded_app(), "POST", "/predict", Some("[]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, json!({"error": "Empty dataset provided"}));
    }

    #[tokio::test]
    async fn test_predict_rejects_non_list() {
        let (status, json) = call(loaded_app(), "POST", "/predict", Some(r#"{"a": 1}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], json!("Data should be a list of records"));

        let (status, json) = call(loaded_app(), "POST", "/predict", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], json!("No data provided"));

        let (status, json) = call(loaded_app(), "POST", "/predict", Some("[{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON payload"));
    }

    #[tokio::test]
    async fn test_predict_missing_feature_is_server_error() {
        let mut record = full_record();
        record.as_object_mut().unwrap().remove("Stacked");
        let body = json!([record]).to_string();

        let (status, json) = call(loaded_app(), "POST", "/predict", Some(&body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json["error"],
            json!("Prediction failed: Missing expected features: ['Stacked']")
        );
    }

    #[tokio::test]
    async fn test_absent_model_keeps_health_available() {
        let (status, json) = call(absent_app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], json!("healthy"));
        assert_eq!(json["model_loaded"], json!(false));

        let body = json!([full_record()]).to_string();
        let (status, json) = call(absent_app(), "POST", "/predict", Some(&body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], json!("Model not loaded. Please check server logs."));

        let (status, json) = call(absent_app(), "GET", "/model-info", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, json!({"error": "No model loaded"}));
    }

    #[tokio::test]
    async fn test_model_info_describes_pipeline() {
        let (status, json) = call(loaded_app(), "GET", "/model-info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model_type"], json!("Pipeline"));
        assert_eq!(json["is_pipeline"], json!(true));
        assert_eq!(json["pipeline_steps"], json!(["scaler", "classifier"]));
        assert_eq!(json["classes"], json!([0, 1]));
        assert_eq!(json["n_features"], json!(9));
        assert_eq!(json["expected_features"][0], json!("Depth (m)"));
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let (status, json) = call(loaded_app(), "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], json!("running"));
        assert_eq!(json["model_loaded"], json!(true));
        assert_eq!(json["endpoints"]["predict"], json!("/predict"));

        let (_, json) = call(absent_app(), "GET", "/", None).await;
        assert_eq!(json["model_type"], json!("None"));
    }

    #[tokio::test]
    async fn test_builtin_sample_routes() {
        for uri in ["/test-prediction", "/test-raw"] {
            let (status, json) = call(loaded_app(), "POST", uri, None).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(json["total_records"], json!(2));
            assert_eq!(json["predictions"].as_array().unwrap().len(), 2);
        }

        let (status, json) = call(absent_app(), "POST", "/test-prediction", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, json) = call(loaded_app(), "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json, json!({"error": "Endpoint not found"}));
    }

    struct Exploding;

    impl Estimator for Exploding {
        fn kind(&self) -> &'static str {
            "Exploding"
        }

        fn n_features(&self) -> Option<usize> {
            None
        }

        fn predict(&self, _rows: &[Vec<f64>]) -> Result<Vec<Label>, PredictionError> {
            panic!("estimator exploded");
        }
    }

    fn exploding_app() -> Router {
        let handle = ModelHandle::new(
            BuiltModel {
                model_type: None,
                feature_names: None,
                estimator: Box::new(Exploding),
            },
            "model.json",
            timestamp_now(),
        );
        app(PredictionService::new(ModelState::Loaded(handle)))
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let body = r#"[{"x": 1}]"#;
        let (status, json) = call(exploding_app(), "POST", "/predict", Some(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, json!({"error": "Internal server error"}));

        let (status, _) = call(exploding_app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_absent_model_wins_over_malformed_body() {
        for body in ["[{", "not json", ""] {
            let (status, json) = call(absent_app(), "POST", "/predict", Some(body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{:?}", body);
            assert_eq!(json["error"], json!("Model not loaded. Please check server logs."));
        }
    }

    #[tokio::test]
    async fn test_oversized_body_is_json_error() {
        let limit = ServerConfig::default().max_body_bytes;
        let body = format!("[{}]", " ".repeat(limit + 1));

        let (status, json) = call(loaded_app(), "POST", "/predict", Some(&body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_wrong_method_is_json_error() {
        let (status, json) = call(loaded_app(), "GET", "/predict", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json, json!({"error": "Method not allowed"}));

        let (status, json) = call(loaded_app(), "DELETE", "/health", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json["error"], json!("Method not allowed"));
    }
}
