use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};

use crate::messages::HookPayload;
use crate::ports::{HookError, HookHandler};

/// Named notification points other plugins subscribe to.
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<String, Vec<Arc<dyn HookHandler>>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.handlers.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("HookRegistry").field("handlers", &counts).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn register(&mut self, hook_name: &str, handler: Arc<dyn HookHandler>) {
        debug!("Registering {} on hook {}", handler.name(), hook_name);
        self.handlers
            .entry(hook_name.to_string())
            .or_default()
            .push(handler);
    }

    /// Runs every handler registered for `hook_name` concurrently. Handler
    /// failures are logged and returned, never raised to the caller.
    pub async fn trigger(&self, hook_name: &str, payload: &HookPayload) -> Vec<HookError> {
        let Some(handlers) = self.handlers.get(hook_name) else {
            debug!("No handlers for hook {}", hook_name);
            return Vec::new();
        };

        let results = join_all(handlers.iter().map(|h| h.handle(hook_name, payload))).await;
        let errors: Vec<HookError> = results.into_iter().filter_map(Result::err).collect();
        for err in &errors {
            warn!("{}", err);
        }
        errors
    }
}

/// Writes every hook invocation to the log.
#[derive(Debug, Default)]
pub struct AuditLogHook;

#[async_trait]
impl HookHandler for AuditLogHook {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn handle(&self, hook_name: &str, payload: &HookPayload) -> Result<(), HookError> {
        let body = serde_json::to_string(payload).map_err(|e| HookError {
            handler: self.name().to_string(),
            message: e.to_string(),
        })?;
        info!("[audit] {} {}", hook_name, body);
        Ok(())
    }
}
