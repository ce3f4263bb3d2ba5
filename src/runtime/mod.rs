//! Function runtime collaborator.
//!
//! # Data Flow
//! ```text
//! Function asset {code, handler, runtime, environment}
//!     → FunctionRuntime::create → Function handle
//!     → Function::invoke({method, path, headers, body, encoding})
//!     → {statusCode, headers, body, encoding} relayed to the client
//! ```
//!
//! # Design Decisions
//! - The runtime is a trait so the dispatcher can be driven by fakes in tests
//! - The default runtime runs `@zeit/fun` from the builder cache via the node bridge
//! - One invocation per request; nothing is kept warm between requests

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::assets::FunctionAsset;
use crate::builders::process::{BridgeError, NodeBridge};

const INVOKE_BRIDGE: &str = include_str!("bridge/invoke.js");

/// Request envelope handed to a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub method: String,
    /// Path and query, as received.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    /// Body, encoded as named by `encoding`.
    pub body: String,
    pub encoding: String,
}

/// What a function returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl InvokeResponse {
    /// Body bytes, base64-decoded when the function says so.
    pub fn body_bytes(&self) -> Result<Vec<u8>, RuntimeError> {
        match self.encoding.as_deref() {
            Some("base64") => STANDARD
                .decode(&self.body)
                .map_err(|e| RuntimeError::Response(format!("invalid base64 body: {e}"))),
            _ => Ok(self.body.clone().into_bytes()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Function invocation failed: {message}")]
    Invocation {
        message: String,
        stack: Option<String>,
    },

    #[error("Invalid function response: {0}")]
    Response(String),

    #[error(transparent)]
    Bridge(BridgeError),
}

impl RuntimeError {
    pub fn stack(&self) -> Option<&str> {
        match self {
            RuntimeError::Invocation { stack, .. } => stack.as_deref(),
            RuntimeError::Bridge(e) => e.stack(),
            RuntimeError::Response(_) => None,
        }
    }
}

impl From<BridgeError> for RuntimeError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Remote { message, stack } => RuntimeError::Invocation { message, stack },
            other => RuntimeError::Bridge(other),
        }
    }
}

/// An invokable function handle.
#[async_trait]
pub trait Function: Send + Sync {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse, RuntimeError>;
}

/// Creates function handles from packaged assets.
#[async_trait]
pub trait FunctionRuntime: Send + Sync {
    async fn create(&self, asset: &FunctionAsset) -> Result<Box<dyn Function>, RuntimeError>;
}

/// Runtime backed by `@zeit/fun` in the builder cache.
#[derive(Debug, Clone)]
pub struct NodeRuntime {
    bridge: NodeBridge,
    cache_dir: PathBuf,
}

impl NodeRuntime {
    pub fn new(bridge: NodeBridge, cache_dir: PathBuf) -> Self {
        Self { bridge, cache_dir }
    }
}

#[async_trait]
impl FunctionRuntime for NodeRuntime {
    async fn create(&self, asset: &FunctionAsset) -> Result<Box<dyn Function>, RuntimeError> {
        Ok(Box::new(NodeFunction {
            runtime: self.clone(),
            asset: asset.clone(),
        }))
    }
}

struct NodeFunction {
    runtime: NodeRuntime,
    asset: FunctionAsset,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokeBridgeRequest<'a> {
    cache_dir: &'a PathBuf,
    function: &'a FunctionAsset,
    event: &'a InvokeRequest,
}

#[async_trait]
impl Function for NodeFunction {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse, RuntimeError> {
        tracing::debug!(handler = %self.asset.handler, runtime = %self.asset.runtime, "Invoking function");
        let bridge_request = InvokeBridgeRequest {
            cache_dir: &self.runtime.cache_dir,
            function: &self.asset,
            event: &request,
        };
        Ok(self.runtime.bridge.call(INVOKE_BRIDGE, &bridge_request).await?)
    }
}
