//! MCP Server for Tilt
//!
//! Exposes a running Tilt instance to MCP clients: resource listings,
//! filtered logs, trigger/enable/disable controls, and condition waits.
//! All tool output is JSON text, matching what the `tilt` CLI reports.

use anyhow::Result;
use clap::Parser;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{stdin, stdout};

use tilt_mcp_core::{TiltClient, WaitOutcome, DEFAULT_CONDITION, DEFAULT_WEB_PORT};

/// Default number of log lines returned when the caller does not ask.
const DEFAULT_LOG_TAIL: usize = 1000;

/// Default wait timeout in seconds.
const DEFAULT_WAIT_TIMEOUT: u64 = 30;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "MCP server for Tilt", long_about = None)]
struct Args {
    /// Web port of the Tilt instance to bridge to
    #[arg(long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,
}

// ============================================================================
// Tool Request Types
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetResourceLogsRequest {
    #[schemars(description = "The name of the Tilt resource to get logs from")]
    resource_name: String,
    #[schemars(description = "Number of log lines to return, after filtering (default: 1000)")]
    tail: Option<usize>,
    #[schemars(description = "Optional case-insensitive regex; only matching lines are returned")]
    filter: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct TriggerResourceRequest {
    #[schemars(description = "The name of the Tilt resource to trigger")]
    resource_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EnableResourceRequest {
    #[schemars(description = "Names of the resources to enable")]
    resource_names: Vec<String>,
    #[schemars(description = "If true, enable these resources and disable all others")]
    enable_only: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DisableResourceRequest {
    #[schemars(description = "Names of the resources to disable")]
    resource_names: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DescribeResourceRequest {
    #[schemars(description = "The name of the resource to describe")]
    resource_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct WaitForResourceRequest {
    #[schemars(description = "The name of the resource to wait for")]
    resource_name: String,
    #[schemars(description = "The condition to wait for (default: 'Ready')")]
    condition: Option<String>,
    #[schemars(description = "Maximum time to wait in seconds (default: 30)")]
    timeout_seconds: Option<u64>,
}

/// Human-readable summary for enable/disable responses.
fn lifecycle_message(names: &[String], action: &str, exclusive: bool) -> String {
    let mut message = format!("Resources [{}] have been {action}", names.join(", "));
    if exclusive {
        message.push_str(" (all others disabled)");
    }
    message
}

#[derive(Serialize)]
struct WaitResponse {
    resource: String,
    condition: String,
    #[serde(flatten)]
    outcome: WaitOutcome,
}

/// The MCP server handler
#[derive(Clone)]
struct TiltMcpServer {
    client: Arc<TiltClient>,
    tool_router: ToolRouter<TiltMcpServer>,
}

impl TiltMcpServer {
    fn new(client: TiltClient) -> Self {
        Self {
            client: Arc::new(client),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl TiltMcpServer {
    #[tool(
        description = "Get all enabled Tilt resources with their name, type, runtime status, and update status.",
        annotations(read_only_hint = true)
    )]
    async fn get_all_resources(&self) -> Result<String, String> {
        let resources = self.client.resources().await.map_err(|e| e.to_string())?;
        tracing::info!(count = resources.len(), "listed resources");
        serde_json::to_string_pretty(&resources).map_err(|e| e.to_string())
    }

    #[tool(
        description = "Get logs from a specific Tilt resource, optionally filtered by a case-insensitive regex and tail-truncated.",
        annotations(read_only_hint = true)
    )]
    async fn get_resource_logs(
        &self,
        Parameters(req): Parameters<GetResourceLogsRequest>,
    ) -> Result<String, String> {
        let tail = req.tail.unwrap_or(DEFAULT_LOG_TAIL);
        let logs = self
            .client
            .logs(&req.resource_name, req.filter.as_deref(), tail)
            .await
            .map_err(|e| e.to_string())?;

        let logs = if logs.is_empty() {
            format!("No logs available for resource: {}", req.resource_name)
        } else {
            logs
        };
        serde_json::to_string(&serde_json::json!({ "logs": logs })).map_err(|e| e.to_string())
    }

    #[tool(description = "Trigger a Tilt resource to rebuild/update.")]
    async fn trigger_resource(
        &self,
        Parameters(req): Parameters<TriggerResourceRequest>,
    ) -> Result<String, String> {
        let output = self
            .client
            .trigger(&req.resource_name)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&serde_json::json!({
            "success": true,
            "resource": req.resource_name,
            "message": format!("Resource \"{}\" has been triggered", req.resource_name),
            "output": output.trim(),
        }))
        .map_err(|e| e.to_string())
    }

    #[tool(description = "Enable one or more Tilt resources; optionally disable all others.")]
    async fn enable_resource(
        &self,
        Parameters(req): Parameters<EnableResourceRequest>,
    ) -> Result<String, String> {
        let only = req.enable_only.unwrap_or(false);
        let output = self
            .client
            .enable(&req.resource_names, only)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&serde_json::json!({
            "success": true,
            "resources": req.resource_names,
            "enable_only": only,
            "message": lifecycle_message(&req.resource_names, "enabled", only),
            "output": output.trim(),
        }))
        .map_err(|e| e.to_string())
    }

    #[tool(description = "Disable one or more Tilt resources.")]
    async fn disable_resource(
        &self,
        Parameters(req): Parameters<DisableResourceRequest>,
    ) -> Result<String, String> {
        let output = self
            .client
            .disable(&req.resource_names)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&serde_json::json!({
            "success": true,
            "resources": req.resource_names,
            "message": lifecycle_message(&req.resource_names, "disabled", false),
            "output": output.trim(),
        }))
        .map_err(|e| e.to_string())
    }

    #[tool(
        description = "Get detailed information about a specific Tilt resource.",
        annotations(read_only_hint = true)
    )]
    async fn describe_resource(
        &self,
        Parameters(req): Parameters<DescribeResourceRequest>,
    ) -> Result<String, String> {
        self.client
            .describe(&req.resource_name)
            .await
            .map_err(|e| e.to_string())
    }

    #[tool(
        description = "Wait for a Tilt resource to reach a condition (e.g. 'Ready'). Disabled or permanently failed resources are reported immediately instead of blocking until the timeout."
    )]
    async fn wait_for_resource(
        &self,
        Parameters(req): Parameters<WaitForResourceRequest>,
    ) -> Result<String, String> {
        let condition = req
            .condition
            .unwrap_or_else(|| DEFAULT_CONDITION.to_string());
        let timeout = req.timeout_seconds.unwrap_or(DEFAULT_WAIT_TIMEOUT);

        let outcome = self
            .client
            .wait_for(&req.resource_name, &condition, timeout)
            .await
            .map_err(|e| e.to_string())?;

        let response = WaitResponse {
            resource: req.resource_name,
            condition,
            outcome,
        };
        serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
    }
}

#[tool_handler]
impl ServerHandler for TiltMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "MCP server bridging to a running Tilt instance.\n\
                 Resources are Tilt's units of work (k8s objects, local commands, docker builds).\n\
                 - get_all_resources / describe_resource / get_resource_logs: read-only inspection\n\
                 - trigger_resource / enable_resource / disable_resource: lifecycle controls\n\
                 - wait_for_resource: block until a condition holds; disabled or failed\n\
                   resources come back immediately as structured outcomes"
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the MCP framing; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tilt_mcp=info".parse()?)
                .add_directive("tilt_mcp_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(port = args.port, "starting Tilt MCP server");

    let client = TiltClient::new(args.port)?;
    let server = TiltMcpServer::new(client);

    let transport = (stdin(), stdout());
    let service = server.serve(transport).await?;
    service.waiting().await?;

    tracing::info!("shutting down Tilt MCP server");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_message_lists_resources() {
        let names = vec!["api".to_string(), "worker".to_string()];
        assert_eq!(
            lifecycle_message(&names, "disabled", false),
            "Resources [api, worker] have been disabled"
        );
    }

    #[test]
    fn test_lifecycle_message_notes_exclusive_enable() {
        let names = vec!["api".to_string()];
        assert_eq!(
            lifecycle_message(&names, "enabled", true),
            "Resources [api] have been enabled (all others disabled)"
        );
    }
}
