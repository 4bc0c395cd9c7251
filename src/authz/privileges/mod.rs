//! Per-session views over the executor.
//!
//! [`Privileges`] is the process-wide handle. It hands out
//! [`SessionPrivileges`], which hand out [`ResourcePrivileges`] (optionally
//! bound to one object), which hand out [`EdgePrivileges`] for a single
//! property or child relation.

mod edge;
mod resource;

pub use edge::EdgePrivileges;
pub use resource::{AllPermissions, ResourcePrivileges, SecuredField, SecuredRecord};

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::{QueryBuilder, Sqlite};

use super::cache::{CacheKey, ResolutionCache};
use super::codegen::{CypherFragment, SqlFilter, SQL_FALSE, SQL_TRUE};
use super::executor::PolicyExecutor;
use super::permission::Permission;
use super::policy::Power;
use super::resource::{Action, ObjectContext};
use super::session::Session;
use crate::config::AuthzConfig;
use crate::errors::{AuthzError, AuthzResult};

#[derive(Debug, Clone)]
pub struct Privileges {
    executor: Arc<PolicyExecutor>,
    config: AuthzConfig,
    cache: Option<Arc<ResolutionCache>>,
}

impl Privileges {
    pub fn new(executor: Arc<PolicyExecutor>, config: AuthzConfig) -> Self {
        let cache = config.cache.then(|| Arc::new(ResolutionCache::new()));
        Self {
            executor,
            config,
            cache,
        }
    }

    pub fn executor(&self) -> &Arc<PolicyExecutor> {
        &self.executor
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&ResolutionCache> {
        self.cache.as_deref()
    }

    pub fn for_session(&self, session: Session) -> SessionPrivileges {
        SessionPrivileges {
            privileges: self.clone(),
            session,
        }
    }

    /// Resolves through the cache when it is enabled.
    pub fn resolve(
        &self,
        action: Action,
        session: &Session,
        resource: &str,
        prop: Option<&str>,
        optimize: bool,
    ) -> AuthzResult<Permission> {
        let resolve = || self.executor.resolve(action, session, resource, prop, optimize);
        match &self.cache {
            Some(cache) => {
                let key = CacheKey::new(session, action, resource, prop, optimize);
                cache.get_or_compute(key, resolve)
            }
            None => resolve(),
        }
    }
}

/// The privileges of one session.
#[derive(Debug, Clone)]
pub struct SessionPrivileges {
    privileges: Privileges,
    session: Session,
}

impl SessionPrivileges {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn privileges(&self) -> &Privileges {
        &self.privileges
    }

    pub fn for_resource(&self, resource: &str) -> AuthzResult<ResourcePrivileges<'_>> {
        let resource = self.privileges.executor.resources().get(resource)?.clone();
        Ok(ResourcePrivileges::new(self, resource, None))
    }

    pub fn for_object<'a>(
        &'a self,
        resource: &str,
        object: &'a dyn ObjectContext,
    ) -> AuthzResult<ResourcePrivileges<'a>> {
        let resource = self.privileges.executor.resources().get(resource)?.clone();
        Ok(ResourcePrivileges::new(self, resource, Some(object)))
    }

    pub fn powers(&self) -> AuthzResult<BTreeSet<Power>> {
        self.privileges.executor.powers_for(&self.session)
    }

    /// Cheap pre-check that needs no object instance.
    pub fn has_power(&self, power: &Power) -> AuthzResult<bool> {
        self.privileges.executor.has_power(&self.session, power)
    }

    pub(crate) fn resolve(
        &self,
        action: Action,
        resource: &str,
        prop: Option<&str>,
        optimize: bool,
    ) -> AuthzResult<Permission> {
        self.privileges
            .resolve(action, &self.session, resource, prop, optimize)
    }
}

/// The query layer a filter is rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBackend {
    /// Cypher, filtering the named node variable.
    Cypher { node: String },
    /// SQL, filtering rows of the aliased table.
    Sql { alias: String },
}

impl QueryBackend {
    pub fn cypher(node: impl Into<String>) -> Self {
        QueryBackend::Cypher { node: node.into() }
    }

    pub fn sql(alias: impl Into<String>) -> Self {
        QueryBackend::Sql {
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbFilterOptions {
    pub action: Action,
    pub backend: QueryBackend,
}

impl DbFilterOptions {
    pub fn new(action: Action, backend: QueryBackend) -> Self {
        Self { action, backend }
    }
}

/// A resolved permission rendered for a query backend. Unconditional
/// results short-circuit to [`ReadFilter::Always`] and [`ReadFilter::Never`].
#[derive(Debug, Clone)]
pub enum ReadFilter {
    Always,
    Never,
    Cypher(CypherFragment),
    Sql(SqlFilter),
}

impl ReadFilter {
    pub fn is_always(&self) -> bool {
        matches!(self, ReadFilter::Always)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, ReadFilter::Never)
    }

    /// Appends the filter to an SQL query under construction.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>) -> AuthzResult<()> {
        match self {
            ReadFilter::Always => {
                builder.push(SQL_TRUE);
            }
            ReadFilter::Never => {
                builder.push(SQL_FALSE);
            }
            ReadFilter::Sql(filter) => filter.push_to(builder),
            ReadFilter::Cypher(_) => {
                return Err(AuthzError::configuration(
                    "a cypher filter cannot be pushed into an sql query",
                ))
            }
        }
        Ok(())
    }

    /// The filter as a Cypher fragment.
    pub fn cypher(&self) -> AuthzResult<CypherFragment> {
        match self {
            ReadFilter::Always => Ok(CypherFragment {
                text: "true".to_string(),
                ..CypherFragment::default()
            }),
            ReadFilter::Never => Ok(CypherFragment {
                text: "false".to_string(),
                ..CypherFragment::default()
            }),
            ReadFilter::Cypher(fragment) => Ok(fragment.clone()),
            ReadFilter::Sql(_) => Err(AuthzError::configuration(
                "an sql filter cannot be rendered as cypher",
            )),
        }
    }
}
