use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::{DbFilterOptions, EdgePrivileges, QueryBackend, ReadFilter, SessionPrivileges};
use crate::authz::codegen::{CypherRenderer, SqlRenderer};
use crate::authz::condition::EvalContext;
use crate::authz::permission::Permission;
use crate::authz::resource::{Action, EnhancedResource, ObjectContext, Record};
use crate::config::AuthzMode;
use crate::errors::{AuthzError, AuthzResult};

/// A session's privileges on one resource, optionally for one object.
pub struct ResourcePrivileges<'a> {
    session: &'a SessionPrivileges,
    resource: Arc<EnhancedResource>,
    object: Option<&'a dyn ObjectContext>,
    memo: RefCell<HashMap<(Option<String>, Action), bool>>,
}

impl<'a> ResourcePrivileges<'a> {
    pub(crate) fn new(
        session: &'a SessionPrivileges,
        resource: Arc<EnhancedResource>,
        object: Option<&'a dyn ObjectContext>,
    ) -> Self {
        Self {
            session,
            resource,
            object,
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn resource(&self) -> &EnhancedResource {
        &self.resource
    }

    pub fn session(&self) -> &SessionPrivileges {
        self.session
    }

    pub fn is_bound(&self) -> bool {
        self.object.is_some()
    }

    /// The same privileges bound to `object`.
    pub fn with_object(&self, object: &'a dyn ObjectContext) -> Self {
        Self::new(self.session, self.resource.clone(), Some(object))
    }

    pub fn resolve(&self, action: Action, prop: Option<&str>) -> AuthzResult<Permission> {
        self.session.resolve(action, &self.resource.name, prop, false)
    }

    /// Evaluates `action` for the bound object. Conditional permissions
    /// need an object; without one they fail with a missing-context error.
    pub fn can(&self, action: Action, prop: Option<&str>) -> AuthzResult<bool> {
        self.can_with(action, prop, self.object)
    }

    fn can_with(
        &self,
        action: Action,
        prop: Option<&str>,
        object: Option<&dyn ObjectContext>,
    ) -> AuthzResult<bool> {
        let permission = self.resolve(action, prop)?;
        let mut ctx = EvalContext::new(self.session.session());
        if let Some(object) = object {
            ctx = ctx.with_object(object);
        }
        permission.is_allowed(&ctx)
    }

    pub fn verify_can(&self, action: Action, prop: Option<&str>) -> AuthzResult<()> {
        self.verify_with(action, prop, self.object)
    }

    fn verify_with(
        &self,
        action: Action,
        prop: Option<&str>,
        object: Option<&dyn ObjectContext>,
    ) -> AuthzResult<()> {
        let mode = self.session.privileges().config().mode;
        if mode == AuthzMode::Off {
            return Ok(());
        }
        if self.can_with(action, prop, object)? {
            return Ok(());
        }
        match mode {
            AuthzMode::Advisory => {
                tracing::warn!(
                    user_id = ?self.session.session().user_id,
                    resource = %self.resource.name,
                    prop = ?prop,
                    action = %action,
                    "access denied (advisory mode - allowing anyway)"
                );
                Ok(())
            }
            _ => Err(AuthzError::access_denied(&self.resource.name, prop, action)),
        }
    }

    /// Lazily evaluated permissions of every secured prop and relation.
    pub fn all(&self) -> AllPermissions<'_, 'a> {
        AllPermissions { privileges: self }
    }

    fn memoized(&self, prop: Option<&str>, action: Action) -> AuthzResult<bool> {
        let key = (prop.map(str::to_string), action);
        if let Some(hit) = self.memo.borrow().get(&key) {
            return Ok(*hit);
        }
        let allowed = self.can(action, prop)?;
        self.memo.borrow_mut().insert(key, allowed);
        Ok(allowed)
    }

    /// Projects `record` for this session. The object must be readable;
    /// secured fields it cannot read come back nulled (relations emptied).
    /// Conditions evaluate against the bound object, or the record itself.
    pub fn secure(&self, record: &Record) -> AuthzResult<SecuredRecord> {
        let object: &dyn ObjectContext = match self.object {
            Some(object) => object,
            None => record,
        };
        self.verify_with(Action::Read, None, Some(object))?;

        let mut fields = BTreeMap::new();
        for (name, value) in &record.fields {
            if self.resource.props.contains(name) || self.resource.relation(name).is_some() {
                continue;
            }
            fields.insert(
                name.clone(),
                SecuredField {
                    value: value.clone(),
                    can_read: true,
                    can_edit: false,
                },
            );
        }

        for key in self.resource.secured_keys() {
            let can_read = self.can_with(Action::Read, Some(key), Some(object))?;
            let can_edit = if self.resource.relation(key).is_some() {
                self.can_with(Action::Create, Some(key), Some(object))?
                    || self.can_with(Action::Edit, Some(key), Some(object))?
            } else {
                self.can_with(Action::Edit, Some(key), Some(object))?
            };
            let raw = record.fields.get(key).cloned().unwrap_or(Value::Null);
            let value = match (can_read, raw) {
                (true, raw) => raw,
                (false, Value::Array(_)) => Value::Array(Vec::new()),
                (false, _) => Value::Null,
            };
            fields.insert(
                key.to_string(),
                SecuredField {
                    value,
                    can_read,
                    can_edit,
                },
            );
        }

        Ok(SecuredRecord {
            resource: self.resource.name.clone(),
            fields,
        })
    }

    pub fn filter_to_readable(&self, backend: QueryBackend) -> AuthzResult<ReadFilter> {
        self.db_filter(DbFilterOptions::new(Action::Read, backend))
    }

    /// Resolves `options.action` and renders it for the backend, or
    /// short-circuits when the result is unconditional.
    pub fn db_filter(&self, options: DbFilterOptions) -> AuthzResult<ReadFilter> {
        let optimize = self.session.privileges().config().optimize_db_filters;
        let permission = self
            .session
            .resolve(options.action, &self.resource.name, None, optimize)?;
        let condition = match permission {
            Permission::Allow => return Ok(ReadFilter::Always),
            Permission::Deny => return Ok(ReadFilter::Never),
            Permission::When(condition) => condition,
        };
        let session = self.session.session();
        Ok(match options.backend {
            QueryBackend::Cypher { node } => {
                ReadFilter::Cypher(CypherRenderer::new(node).render(&condition, session))
            }
            QueryBackend::Sql { alias } => {
                ReadFilter::Sql(SqlRenderer::new(alias, self.resource.db.clone()).render(&condition, session))
            }
        })
    }

    /// Privileges on one secured prop or child relation.
    pub fn edge(&self, key: &str) -> AuthzResult<EdgePrivileges<'_, 'a>> {
        if !self.resource.secured_keys().any(|k| k == key) {
            return Err(AuthzError::configuration(format!(
                "{} has no secured prop or relation `{key}`",
                self.resource.name
            )));
        }
        Ok(EdgePrivileges::new(self, key.to_string()))
    }
}

/// Memoized view returned by [`ResourcePrivileges::all`]; each
/// (key, action) pair is evaluated on first access only.
pub struct AllPermissions<'p, 'a> {
    privileges: &'p ResourcePrivileges<'a>,
}

impl AllPermissions<'_, '_> {
    pub fn get(&self, key: &str, action: Action) -> AuthzResult<bool> {
        self.privileges.memoized(Some(key), action)
    }

    pub fn object(&self, action: Action) -> AuthzResult<bool> {
        self.privileges.memoized(None, action)
    }

    pub fn can_read(&self, key: &str) -> AuthzResult<bool> {
        self.get(key, Action::Read)
    }

    pub fn can_edit(&self, key: &str) -> AuthzResult<bool> {
        self.get(key, Action::Edit)
    }

    pub fn evaluated(&self) -> usize {
        self.privileges.memo.borrow().len()
    }

    /// Forces every secured key; read and edit per key.
    pub fn to_map(&self) -> AuthzResult<BTreeMap<String, BTreeMap<Action, bool>>> {
        let mut map = BTreeMap::new();
        for key in self.privileges.resource.secured_keys() {
            let mut actions = BTreeMap::new();
            for action in Action::PROP {
                actions.insert(action, self.get(key, action)?);
            }
            map.insert(key.to_string(), actions);
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuredField {
    pub value: Value,
    pub can_read: bool,
    pub can_edit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecuredRecord {
    pub resource: String,
    pub fields: BTreeMap<String, SecuredField>,
}

impl SecuredRecord {
    pub fn field(&self, name: &str) -> Option<&SecuredField> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> &Value {
        self.fields.get(name).map(|f| &f.value).unwrap_or(&Value::Null)
    }
}
