//! Per-request control flow.
//!
//! Every request ends in exactly one [`Reply`], which is turned into the
//! hyper response in one place, so the `Content-Type` and `Powered-By`
//! headers are always set and the response is completed exactly once:
//!
//! 1. non-`POST` method: 405 `method_not_allowed`
//! 2. empty path: 400 `invalid_request`
//! 3. unknown path: 404 `function_not_found`
//! 4. request logger built with `url`, `method` and a fresh `requestId`
//! 5. handler invoked on its own task
//! 6. envelope written with status 200, success through the compiled
//!    serializer when there is one
//! 7. handler error or panic: 500 `internal_error`

use crate::envelope::{
    fail, serialize_error, serialize_generic, Envelope, ErrorCode, ErrorProjection, FunctionError,
};
use crate::function::{FunctionRegistry, RequestContext};
use crate::http::{RawRequest, Reply};
use crate::logger::ScopedLogger;
use crate::runtime::{ServerConfig, ServerHandle};
use crate::schema::CompiledSerializer;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::HeaderValue;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Bodies of the transport-level failures, encoded once.
struct CannedReplies {
    method_not_allowed: Bytes,
    invalid_request: Bytes,
    function_not_found: Bytes,
}

impl CannedReplies {
    fn new() -> Self {
        let encode = |code| Bytes::from(serialize_error(&fail(FunctionError::from_code(code))));
        Self {
            method_not_allowed: encode(ErrorCode::MethodNotAllowed),
            invalid_request: encode(ErrorCode::InvalidRequest),
            function_not_found: encode(ErrorCode::FunctionNotFound),
        }
    }
}

/// Routes requests to registered functions and encodes their envelopes.
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
    logger: ScopedLogger,
    server_header: HeaderValue,
    max_body_size: usize,
    canned: CannedReplies,
}

impl Dispatcher {
    pub fn new(registry: Arc<FunctionRegistry>, logger: ScopedLogger, config: &ServerConfig) -> Self {
        let server_header = HeaderValue::from_str(&config.server_header).unwrap_or_else(|_| {
            logger.warn("invalid server header value, falling back to `Fireball`");
            HeaderValue::from_static("Fireball")
        });

        Self {
            registry,
            logger,
            server_header,
            max_body_size: config.max_body_size,
            canned: CannedReplies::new(),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Handle one request and produce its response.
    pub async fn dispatch<B>(&self, req: Request<B>, server: &ServerHandle) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.handle(req, server)
            .await
            .into_response(&self.server_header)
    }

    async fn handle<B>(&self, req: Request<B>, server: &ServerHandle) -> Reply
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.method() != Method::POST {
            return Reply::new(
                StatusCode::METHOD_NOT_ALLOWED,
                self.canned.method_not_allowed.clone(),
            );
        }

        let path = req.uri().path();
        if path.is_empty() {
            return Reply::new(StatusCode::BAD_REQUEST, self.canned.invalid_request.clone());
        }

        let Some(route) = self.registry.resolve(path) else {
            return Reply::new(StatusCode::NOT_FOUND, self.canned.function_not_found.clone());
        };

        let url = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(path)
            .to_string();
        let request_id = Uuid::new_v4().to_string();
        let logger = self
            .logger
            .for_request(&url, req.method().as_str(), &request_id);
        logger.info("incoming request");

        let started = Instant::now();
        let request = match RawRequest::from_request(req, self.max_body_size).await {
            Ok(request) => request,
            Err(err) => {
                logger.warn_with("failed to read request body", &Value::from(err.to_string()));
                let envelope = fail(
                    FunctionError::from_code(ErrorCode::InvalidRequest).with_info("reason", err.to_string()),
                );
                return Reply::new(StatusCode::BAD_REQUEST, serialize_error(&envelope));
            }
        };

        let ctx = RequestContext {
            logger: logger.clone(),
            server: server.clone(),
        };
        let handler = route.handler;
        let outcome = tokio::spawn(async move { handler.call(request, ctx).await }).await;

        let reply = match outcome {
            Ok(Ok(envelope)) => Self::emit(envelope, route.serializer.as_deref(), &logger),
            Ok(Err(err)) => Self::internal_error(err.projection(), &logger),
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                Self::internal_error(ErrorProjection::from_panic(payload.as_ref()), &logger)
            }
            Err(join) => Self::internal_error(ErrorProjection::new("Cancelled", join.to_string()), &logger),
        };

        logger.debug(&format!(
            "request completed with status {} in {:?}",
            reply.status.as_u16(),
            started.elapsed()
        ));
        reply
    }

    fn emit(envelope: Envelope, serializer: Option<&CompiledSerializer>, logger: &ScopedLogger) -> Reply {
        match &envelope {
            Envelope::Failure { error } => {
                let mut data = Map::new();
                data.insert(
                    "response".to_string(),
                    serde_json::to_value(error).unwrap_or(Value::Null),
                );
                logger.warn_with("function execution was unsuccessful", &Value::Object(data));
                Reply::new(StatusCode::OK, serialize_error(&envelope))
            }
            Envelope::Success { .. } => {
                let body = match serializer {
                    Some(serializer) => serializer.serialize(&envelope).unwrap_or_else(|err| {
                        logger.warn_with(
                            "compiled serializer rejected response, using generic encoding",
                            &Value::from(err.to_string()),
                        );
                        serialize_generic(&envelope)
                    }),
                    None => serialize_generic(&envelope),
                };
                Reply::new(StatusCode::OK, body)
            }
        }
    }

    fn internal_error(projection: ErrorProjection, logger: &ScopedLogger) -> Reply {
        let detail = projection.into_value();
        let mut data = Map::new();
        data.insert("error".to_string(), detail.clone());
        logger.error_with(
            "function execution resulted in an unhandled exception",
            &Value::Object(data),
        );

        let envelope = fail(FunctionError::from_code(ErrorCode::InternalError).with_info("error", detail));
        Reply::new(StatusCode::INTERNAL_SERVER_ERROR, serialize_error(&envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::success;
    use crate::function::HandlerError;
    use crate::schema::FunctionSchema;
    use http_body_util::BodyExt;
    use hyper::header::CONTENT_TYPE;
    use serde_json::json;
    use tracing_test::traced_test;

    async fn hello(_req: RawRequest, _ctx: RequestContext) -> Result<Envelope, HandlerError> {
        Ok(success(json!({"message": "hi"})))
    }

    fn dispatcher(registry: FunctionRegistry) -> (Dispatcher, ServerHandle) {
        let config = ServerConfig::default();
        let handle = ServerHandle::detached(config.clone());
        let dispatcher = Dispatcher::new(Arc::new(registry), ScopedLogger::new("server"), &config);
        (dispatcher, handle)
    }

    async fn call(dispatcher: &Dispatcher, handle: &ServerHandle, req: Request<Full<Bytes>>) -> (StatusCode, Value) {
        let response = dispatcher.dispatch(req, handle).await;
        let status = response.status();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["powered-by"], "Fireball");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post(uri: &str) -> Request<Full<Bytes>> {
        Request::post(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let mut registry = FunctionRegistry::new();
        registry.register("hello", hello);
        let (dispatcher, handle) = dispatcher(registry);

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS] {
            let req = Request::builder()
                .method(method)
                .uri("/hello")
                .body(Full::new(Bytes::new()))
                .unwrap();
            let (status, body) = call(&dispatcher, &handle, req).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body["error"]["code"], "method_not_allowed");
        }
    }

    #[tokio::test]
    async fn test_empty_path_is_invalid() {
        let (dispatcher, handle) = dispatcher(FunctionRegistry::new());
        let req = Request::post("example.com:80").body(Full::new(Bytes::new())).unwrap();
        let (status, body) = call(&dispatcher, &handle, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let (dispatcher, handle) = dispatcher(FunctionRegistry::new());
        let (status, body) = call(&dispatcher, &handle, post("/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "function_not_found");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_success_generic_and_compiled() {
        let mut registry = FunctionRegistry::new();
        registry.register("one", hello);
        let schema = FunctionSchema::new(json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        }));
        registry.register_with_schema("two", &schema, hello).unwrap();
        let (dispatcher, handle) = dispatcher(registry);

        let (status, one) = call(&dispatcher, &handle, post("/one")).await;
        assert_eq!(status, StatusCode::OK);
        let (_, two) = call(&dispatcher, &handle, post("/two")).await;
        assert_eq!(one, json!({"success": true, "data": {"message": "hi"}}));
        assert_eq!(one, two);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_serializer_mismatch_falls_back() {
        let mut registry = FunctionRegistry::new();
        let schema = FunctionSchema::new(json!({
            "type": "object",
            "properties": { "message": { "type": "integer" } }
        }));
        registry.register_with_schema("typed", &schema, hello).unwrap();
        let (dispatcher, handle) = dispatcher(registry);

        let (status, body) = call(&dispatcher, &handle, post("/typed")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "hi");
        assert!(logs_contain("using generic encoding"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_reported_failure_keeps_status_200() {
        let mut registry = FunctionRegistry::new();
        registry.register("deny", |_req: RawRequest, _ctx: RequestContext| async {
            Ok::<_, HandlerError>(fail(FunctionError::new("forbidden", "not allowed").with_info("role", "guest")))
        });
        let (dispatcher, handle) = dispatcher(registry);

        let (status, body) = call(&dispatcher, &handle, post("/deny")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], "forbidden");
        assert_eq!(body["error"]["additionalInfo"]["role"], "guest");
        assert!(body.get("data").is_none());
        assert!(logs_contain("function execution was unsuccessful"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_handler_error_maps_to_internal_error() {
        let mut registry = FunctionRegistry::new();
        registry.register("broken", |_req: RawRequest, _ctx: RequestContext| async {
            Err::<Envelope, _>(HandlerError::named("DbError", "connection reset"))
        });
        let (dispatcher, handle) = dispatcher(registry);

        let (status, body) = call(&dispatcher, &handle, post("/broken")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "internal_error");
        assert_eq!(body["error"]["message"], "unexpected error");
        assert_eq!(body["error"]["additionalInfo"]["error"]["name"], "DbError");
        assert_eq!(body["error"]["additionalInfo"]["error"]["message"], "connection reset");
        assert!(logs_contain("unhandled exception"));
    }

    #[tokio::test]
    async fn test_panic_maps_to_internal_error() {
        let mut registry = FunctionRegistry::new();
        registry.register("panics", |_req: RawRequest, _ctx: RequestContext| async {
            if true {
                panic!("handler blew up");
            }
            Ok::<_, HandlerError>(success(json!({})))
        });
        registry.register("hello", hello);
        let (dispatcher, handle) = dispatcher(registry);

        let (status, body) = call(&dispatcher, &handle, post("/panics")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["additionalInfo"]["error"]["message"], "handler blew up");

        let (status, _) = call(&dispatcher, &handle, post("/hello")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_reaches_handler() {
        let mut registry = FunctionRegistry::new();
        registry.register("echo", |req: RawRequest, ctx: RequestContext| async move {
            let input: Value = req.json().unwrap_or(Ok(Value::Null))?;
            Ok::<_, HandlerError>(success(json!({"input": input, "requestId": ctx.request_id()})))
        });
        let (dispatcher, handle) = dispatcher(registry);

        let req = Request::post("/echo")
            .body(Full::new(Bytes::from_static(br#"{"n":5}"#)))
            .unwrap();
        let (_, body) = call(&dispatcher, &handle, req).await;
        assert_eq!(body["data"]["input"], json!({"n": 5}));
        assert_eq!(body["data"]["requestId"].as_str().map(str::len), Some(36));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected_before_handler() {
        let mut registry = FunctionRegistry::new();
        registry.register("hello", hello);
        let config = ServerConfig::default().max_body_size(4);
        let handle = ServerHandle::detached(config.clone());
        let dispatcher = Dispatcher::new(Arc::new(registry), ScopedLogger::disabled(), &config);

        let req = Request::post("/hello")
            .body(Full::new(Bytes::from_static(b"0123456789")))
            .unwrap();
        let (status, body) = call(&dispatcher, &handle, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }
}
