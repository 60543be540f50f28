//! Explicit registry of custom requirement handlers.
//!
//! Handlers are registered by name at startup and the registry is checked against every
//! configured policy before the server accepts traffic, so a policy can never reach a request
//! with a handler that does not exist.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{auth::ticket::Principal, authz::policy::PolicySet, errors::Error};

#[async_trait::async_trait]
pub trait RequirementHandler: Send + Sync {
    /// `true` when the requirement is satisfied. `resource` is the targeted resource id resolved
    /// from the request, when the requirement names one.
    async fn handle(&self, principal: Option<&Principal>, resource: Option<&str>) -> bool;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RequirementHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn RequirementHandler>) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RequirementHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Every custom handler referenced by `policies` must be registered.
    pub fn validate(&self, policies: &PolicySet) -> Result<(), Error> {
        let mut missing: Vec<String> = policies
            .iter()
            .flat_map(move |policy| {
                policy
                    .custom_handlers()
                    .filter(move |handler| !self.contains(handler))
                    .map(move |handler| format!("{handler} (policy '{}')", policy.name()))
            })
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(Error::Configuration {
            message: format!("unregistered requirement handlers: {}", missing.join(", ")),
        })
    }
}
