//! Action router.
//!
//! Per request: resolve the owning handler, ask the policy engine for a
//! verdict, check whether the user must confirm first, run the handler,
//! and stamp the result with its module and action. Every path ends in a
//! well-formed [`ActionResult`]; nothing a handler does escapes `route`.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use keel_core::policy::PolicyEngine;
use keel_core::types::{ActionRequest, ActionResult, Params};

use crate::confirmation::ConfirmationGate;
use crate::error::ActionError;
use crate::handler::{ActionHandler, ActionRegistry};

/// Module name stamped on results the router produces itself.
pub const ROUTER_MODULE: &str = "router";

/// Error reported for a batch entry that names no action.
pub const MISSING_ACTION: &str = "Tool call missing 'action' field";

/// Routes actions through policy and confirmation checks to their handlers.
pub struct Router {
    registry: ActionRegistry,
    policy: Arc<PolicyEngine>,
}

impl Router {
    pub fn new(registry: ActionRegistry, policy: Arc<PolicyEngine>) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Route one action.
    ///
    /// Actions in the confirmation set come back with
    /// `requires_confirmation == true` and are not executed.
    pub async fn route(&self, action: &str, params: &Params) -> ActionResult {
        self.dispatch(action, params, true).await
    }

    /// Route an action the user has already approved.
    ///
    /// Skips only the confirmation check; the policy still applies.
    pub async fn route_confirmed(&self, action: &str, params: &Params) -> ActionResult {
        self.dispatch(action, params, false).await
    }

    /// Route each request in order, one result per request.
    pub async fn process_batch(&self, requests: &[ActionRequest]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            if request.name.is_empty() {
                warn!("Batch entry without an action name");
                results.push(ActionResult::failure(MISSING_ACTION));
                continue;
            }
            results.push(self.route(&request.name, &request.params).await);
        }
        results
    }

    /// Take an approved confirmation off the gate and run it.
    ///
    /// Returns `None` if the gate holds no entry with that id.
    pub async fn approve(&self, gate: &ConfirmationGate, id: Uuid) -> Option<ActionResult> {
        let pending = gate.approve(id)?;
        info!(%id, action = %pending.action, "Confirmation approved");
        Some(self.route_confirmed(&pending.action, &pending.params).await)
    }

    /// Whether `route` would hold this action for confirmation.
    pub fn needs_confirmation(&self, action: &str) -> bool {
        self.policy.requires_confirmation(action)
    }

    async fn dispatch(&self, action: &str, params: &Params, check_confirmation: bool) -> ActionResult {
        let started = Instant::now();

        let result = match self.registry.resolve(action) {
            None => ActionResult::from(ActionError::UnknownAction {
                action: action.to_string(),
                prefixes: self.registry.prefixes(),
            })
            .stamped(ROUTER_MODULE, action),
            Some(handler) => {
                let module = handler.name().to_string();
                self.run(handler, action, params, check_confirmation)
                    .await
                    .stamped(&module, action)
            }
        };

        let outcome = if result.success {
            "success"
        } else if result.requires_confirmation {
            "confirmation_required"
        } else {
            "failure"
        };
        info!(
            action,
            module = result.module.as_deref().unwrap_or(ROUTER_MODULE),
            outcome,
            duration_ms = started.elapsed().as_millis() as u64,
            "Action routed"
        );

        result
    }

    async fn run(
        &self,
        handler: Arc<dyn ActionHandler>,
        action: &str,
        params: &Params,
        check_confirmation: bool,
    ) -> ActionResult {
        let verdict = self.policy.validate(action, params);
        if !verdict.allowed {
            warn!(action, reason = %verdict.reason, "Action denied by policy");
            return ActionResult::from(ActionError::PolicyDenied {
                action: action.to_string(),
                reason: verdict.reason,
            });
        }

        if check_confirmation && self.needs_confirmation(action) {
            let mut result = ActionResult::confirmation_required(action, params);
            result
                .data
                .insert("description".to_string(), handler.describe(action, params).into());
            return result;
        }

        // Run on its own task so a panicking handler surfaces as a JoinError.
        let task = {
            let action = action.to_string();
            let params = params.clone();
            tokio::spawn(async move { handler.execute(&action, &params).await })
        };

        match task.await {
            Ok(Ok(result)) => {
                if !result.success {
                    warn!(action, error = result.error.as_deref().unwrap_or(""), "Action failed");
                }
                result
            }
            Ok(Err(err)) => {
                warn!(action, error = %err, "Handler returned an error");
                ActionResult::from(&err)
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "handler task was cancelled".to_string()
                };
                warn!(action, error = %message, "Handler panicked");
                ActionResult::from(ActionError::HandlerFailed(message))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
