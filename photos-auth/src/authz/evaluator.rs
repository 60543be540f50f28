//! Policy evaluation.
//!
//! Each evaluation walks `Pending -> Evaluating(i) -> {Succeeded, Failed}` over the policy's
//! requirements and stops at the first requirement that fails. Requirements are a pure
//! conjunction, so their order only decides which deny reason is reported.

use std::{collections::HashMap, fmt, sync::Arc};

use tracing::{error, instrument, trace};

use crate::{
    auth::ticket::Principal,
    authz::{
        policy::{Policy, PolicySet, Requirement},
        registry::HandlerRegistry,
    },
    errors::Error,
};

/// Diagnostic deny reason. Logged server side, never returned to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    ClaimMismatch,
    CustomRequirementFailed(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Unauthenticated => f.write_str("Unauthenticated"),
            DenyReason::ClaimMismatch => f.write_str("ClaimMismatch"),
            DenyReason::CustomRequirementFailed(name) => write!(f, "CustomRequirementFailed:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EvaluationState {
    Pending,
    Evaluating(usize),
    Succeeded,
    Failed(DenyReason),
}

#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    policies: PolicySet,
    registry: HandlerRegistry,
}

impl PolicyEvaluator {
    /// Fails with [`Error::Configuration`] if any policy references an unregistered handler.
    pub fn new(policies: PolicySet, registry: HandlerRegistry) -> Result<Self, Error> {
        registry.validate(&policies)?;
        Ok(Self { policies, registry })
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn policy(&self, name: &str) -> Result<Arc<Policy>, Error> {
        self.policies.require(name)
    }

    /// Evaluate `policy` for `principal`. `route_params` supplies the resource ids custom
    /// requirements refer to by name.
    #[instrument(skip_all, fields(policy = %policy.name()))]
    pub async fn evaluate(&self, policy: &Policy, principal: Option<&Principal>, route_params: &HashMap<String, String>) -> Decision {
        let mut state = EvaluationState::Pending;
        loop {
            trace!(?state, "Policy evaluation step");
            state = match state {
                EvaluationState::Pending => EvaluationState::Evaluating(0),
                EvaluationState::Evaluating(index) => match policy.requirements().get(index) {
                    None => EvaluationState::Succeeded,
                    Some(requirement) => match self.check(requirement, principal, route_params).await {
                        Ok(()) => EvaluationState::Evaluating(index + 1),
                        Err(reason) => EvaluationState::Failed(reason),
                    },
                },
                EvaluationState::Succeeded => return Decision::Allow,
                EvaluationState::Failed(reason) => return Decision::Deny(reason),
            };
        }
    }

    async fn check(
        &self,
        requirement: &Requirement,
        principal: Option<&Principal>,
        route_params: &HashMap<String, String>,
    ) -> Result<(), DenyReason> {
        match requirement {
            Requirement::AuthenticatedUser => principal.map(|_| ()).ok_or(DenyReason::Unauthenticated),
            Requirement::ClaimEquals { claim_type, value } => {
                let principal = principal.ok_or(DenyReason::Unauthenticated)?;
                if principal.has_claim(claim_type, value) {
                    Ok(())
                } else {
                    Err(DenyReason::ClaimMismatch)
                }
            }
            Requirement::Custom { handler, resource } => {
                let Some(registered) = self.registry.get(handler) else {
                    // unreachable after startup validation
                    error!(handler = %handler, "Custom requirement handler missing at request time");
                    return Err(DenyReason::CustomRequirementFailed(handler.clone()));
                };
                let resource_id = resource.as_ref().and_then(|name| route_params.get(name)).map(String::as_str);

                if registered.handle(principal, resource_id).await {
                    Ok(())
                } else {
                    Err(DenyReason::CustomRequirementFailed(handler.clone()))
                }
            }
        }
    }
}
