//! HTTP JSON-RPC Server
//!
//! Provides the HTTP endpoint for the registry contract.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::methods::{
    handle_add_member, handle_close_round, handle_finalize_model, handle_get_aggregate_result,
    handle_get_fl_config, handle_get_round, handle_grant_consent, handle_is_member,
    handle_list_participants, handle_open_round, handle_remove_member, handle_revoke_consent,
    handle_submit_commit, handle_submit_reveal, handle_vote_finalize, GatewayContext,
    GatewayError,
};
use fl_registry::RegistryError;

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP gateway server
pub struct HttpGateway {
    context: Arc<GatewayContext>,
}

impl HttpGateway {
    /// Create a new HTTP gateway
    pub fn new(context: Arc<GatewayContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser-based consent apps
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP gateway listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<GatewayContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = dispatch_method(&context, &request.method, request.params);

    let response = match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Dispatch to appropriate method handler
fn dispatch_method(
    ctx: &GatewayContext,
    method: &str,
    params: Value,
) -> Result<Value, GatewayError> {
    tracing::debug!("RPC method called: {}", method);
    match method {
        "getFlConfig" => to_value(handle_get_fl_config(ctx, parse_params(params)?)?),
        "getRound" => to_value(handle_get_round(ctx, parse_params(params)?)?),
        "listParticipants" => to_value(handle_list_participants(ctx, parse_params(params)?)?),
        "getAggregateResult" => to_value(handle_get_aggregate_result(ctx, parse_params(params)?)?),
        "isMember" => to_value(handle_is_member(ctx, parse_params(params)?)?),

        "grantConsent" => {
            handle_grant_consent(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "revokeConsent" => {
            handle_revoke_consent(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "openRound" => to_value(handle_open_round(ctx, parse_params(params)?)?),
        "closeRound" => {
            handle_close_round(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "submitCommit" => {
            handle_submit_commit(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "submitReveal" => {
            handle_submit_reveal(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "voteFinalize" => {
            handle_vote_finalize(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "finalizeModel" => to_value(handle_finalize_model(ctx, parse_params(params)?)?),
        "addMember" => {
            handle_add_member(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }
        "removeMember" => {
            handle_remove_member(ctx, parse_params(params)?)?;
            Ok(json!("ok"))
        }

        "getHealth" => Ok(json!("ok")),

        "getVersion" => Ok(json!({
            "fl-registry": env!("CARGO_PKG_VERSION"),
        })),

        _ => Err(GatewayError::MethodNotFound(method.to_string())),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, GatewayError> {
    serde_json::from_value(params).map_err(|e| GatewayError::InvalidParams(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::InternalError(e.to_string()))
}

/// Map error to JSON-RPC error code. Every registry failure kind gets its
/// own code so transport clients can distinguish them.
fn error_code(error: &GatewayError) -> i32 {
    match error {
        GatewayError::InvalidParams(_) => -32602,
        GatewayError::MethodNotFound(_) => -32601,
        GatewayError::InternalError(_) => -32603,
        GatewayError::Unauthorized(_) => -32001,
        GatewayError::Registry(e) => match e {
            RegistryError::Unauthorized => -32001,
            RegistryError::ConsentDenied => -32002,
            RegistryError::RoundNotFound => -32003,
            RegistryError::RoundClosed => -32004,
            RegistryError::CapacityExceeded => -32005,
            RegistryError::NoMatchingCommit => -32006,
            RegistryError::RoundNotClosed => -32007,
            RegistryError::NoVotes => -32008,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            error_code(&GatewayError::Registry(RegistryError::Unauthorized)),
            error_code(&GatewayError::Registry(RegistryError::ConsentDenied)),
            error_code(&GatewayError::Registry(RegistryError::RoundNotFound)),
            error_code(&GatewayError::Registry(RegistryError::RoundClosed)),
            error_code(&GatewayError::Registry(RegistryError::CapacityExceeded)),
            error_code(&GatewayError::Registry(RegistryError::NoMatchingCommit)),
            error_code(&GatewayError::Registry(RegistryError::RoundNotClosed)),
            error_code(&GatewayError::Registry(RegistryError::NoVotes)),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_unknown_method_not_found() {
        let ctx = GatewayContext {
            registry: std::sync::Arc::new(fl_registry::Registry::new()),
        };
        let result = dispatch_method(&ctx, "mintTokens", Value::Null);
        assert!(matches!(result, Err(GatewayError::MethodNotFound(_))));
    }
}
