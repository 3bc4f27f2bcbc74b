//! Socket RPC request handling
//!
//! One [`RpcDispatcher`] serves every connection. It is transport-agnostic:
//! the server feeds it lines and writes back whatever it returns, so the
//! whole method surface can be exercised without a socket.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::{json, Value};

use fieldnode_core::VERSION;

use crate::context::NodeContext;
use crate::error::RpcError;
use crate::rpc::protocol::{contents, Method, Request, Response};
use crate::rpc::registry::Registry;
use crate::rpc::subscriptions::{ClientId, SubscriptionTable};

pub struct RpcDispatcher {
    ctx: Arc<NodeContext>,
    registry: Arc<Registry>,
    subscriptions: Arc<SubscriptionTable>,
}

impl RpcDispatcher {
    pub fn new(
        ctx: Arc<NodeContext>,
        registry: Arc<Registry>,
        subscriptions: Arc<SubscriptionTable>,
    ) -> Self {
        Self {
            ctx,
            registry,
            subscriptions,
        }
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionTable> {
        &self.subscriptions
    }

    /// Handle one request line and return the response line
    pub async fn handle_line(&self, client: ClientId, line: &str) -> String {
        let response = match Request::parse(line) {
            Ok(request) => {
                let id = request.id.clone();
                match self.handle_request(client, &request).await {
                    Ok(result) => Response::result(id, result),
                    Err(e) => {
                        warn!("rpc {} from client {}: {}", request.method, client.0, e);
                        Response::error(id, e)
                    }
                }
            }
            Err(response) => {
                warn!("rpc: malformed request from client {}", client.0);
                response
            }
        };
        response.to_line()
    }

    pub async fn handle_request(&self, client: ClientId, request: &Request) -> Result<Value, RpcError> {
        debug!("rpc {} from client {}", request.method, client.0);
        let method = Method::from_name(&request.method)
            .ok_or_else(|| RpcError::bad_request("Unknown method"))?;

        match method {
            Method::Initialize => Ok(json!({
                "serverName": self.ctx.device_name,
                "serverVersion": VERSION,
                "capabilities": {
                    "supportsSubscriptions": true,
                    "supportsResources": true,
                    "supportsTelemetry": true,
                },
            })),
            Method::ResourcesList => {
                let resources: Vec<Value> = self
                    .registry
                    .resources()
                    .iter()
                    .map(|r| json!({ "uri": r.uri, "type": r.type_tag }))
                    .collect();
                Ok(json!({ "resources": resources }))
            }
            Method::ResourceRead => {
                let resource = self
                    .registry
                    .resource(request.uri()?)
                    .ok_or_else(|| RpcError::not_found("Resource not found"))?;
                let value = resource.read(&self.ctx).await?;
                Ok(contents(&value))
            }
            Method::Subscribe => {
                let resource = self
                    .registry
                    .resource(request.uri()?)
                    .ok_or_else(|| RpcError::not_found("Resource not found"))?;
                self.subscriptions.subscribe(client, resource.uri).await?;
                Ok(json!({ "success": true }))
            }
            Method::Unsubscribe => {
                let resource = self
                    .registry
                    .resource(request.uri()?)
                    .ok_or_else(|| RpcError::not_found("Resource not found"))?;
                self.subscriptions.unsubscribe(client, resource.uri).await;
                Ok(json!({ "success": true }))
            }
            Method::ToolExecute => {
                let tool = self
                    .registry
                    .tool(request.uri()?)
                    .ok_or_else(|| RpcError::not_found("Tool not found"))?;
                let params = match request.params.get("params") {
                    Some(Value::Object(params)) => params.clone(),
                    _ => serde_json::Map::new(),
                };
                let result = tool.execute(&self.ctx, &params).await;
                serde_json::to_value(result)
                    .map_err(|e| RpcError::new(500, format!("Encoding failure: {}", e)))
            }
        }
    }
}
