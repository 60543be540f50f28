//! Named authorization policies.
//!
//! A [`Policy`] is an immutable conjunction of [`Requirement`]s plus the authentication schemes
//! allowed to establish the principal it is evaluated against. The full [`PolicySet`] is built
//! once from configuration at startup.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use crate::{auth::selector::SchemeKind, auth::ticket::ClaimType, config::PolicyConfig, errors::Error};

/// Policy names used by the built-in routes.
pub mod names {
    pub const AUTHENTICATED: &str = "Authenticated";
    pub const CAN_ADD_PHOTO: &str = "CanAddPhoto";
    pub const MUST_OWN_PHOTO: &str = "MustOwnPhoto";
    pub const BETA: &str = "Beta";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// Any authenticated principal
    AuthenticatedUser,
    /// Exact, case-sensitive claim match
    ClaimEquals { claim_type: ClaimType, value: String },
    /// Delegated to the handler registered under `handler`. `resource` names the route parameter
    /// holding the targeted resource id, if the handler needs one.
    Custom {
        handler: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    requirements: Vec<Requirement>,
    schemes: Vec<SchemeKind>,
}

impl Policy {
    pub fn new(name: impl Into<String>, requirements: Vec<Requirement>, schemes: Vec<SchemeKind>) -> Result<Self, Error> {
        let name = name.into();
        if requirements.is_empty() {
            return Err(Error::Configuration {
                message: format!("policy '{name}' has no requirements"),
            });
        }
        if schemes.is_empty() {
            return Err(Error::Configuration {
                message: format!("policy '{name}' accepts no authentication schemes"),
            });
        }
        Ok(Self {
            name,
            requirements,
            schemes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn schemes(&self) -> &[SchemeKind] {
        &self.schemes
    }

    /// Handler names referenced by this policy's custom requirements.
    pub fn custom_handlers(&self) -> impl Iterator<Item = &str> {
        self.requirements.iter().filter_map(|r| match r {
            Requirement::Custom { handler, .. } => Some(handler.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: HashMap<String, Arc<Policy>>,
}

impl PolicySet {
    pub fn from_config(config: &BTreeMap<String, PolicyConfig>) -> Result<Self, Error> {
        let policies = config
            .iter()
            .map(|(name, policy)| {
                let policy = Policy::new(name.clone(), policy.requirements.clone(), policy.schemes.clone())?;
                Ok((name.clone(), Arc::new(policy)))
            })
            .collect::<Result<HashMap<_, _>, Error>>()?;

        Ok(Self { policies })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    /// Look up a policy a route depends on. A missing policy is a startup configuration error.
    pub fn require(&self, name: &str) -> Result<Arc<Policy>, Error> {
        self.get(name).ok_or_else(|| Error::Configuration {
            message: format!("policy '{name}' is referenced but not configured"),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
