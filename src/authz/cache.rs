use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::permission::Permission;
use super::resource::Action;
use super::session::{Role, Session};
use crate::errors::AuthzResult;

/// Resolution only depends on the role names a session holds, so sessions
/// with the same roles share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    roles: Vec<Role>,
    action: Action,
    resource: String,
    prop: Option<String>,
    optimized: bool,
}

impl CacheKey {
    pub fn new(session: &Session, action: Action, resource: &str, prop: Option<&str>, optimized: bool) -> Self {
        Self {
            roles: session.role_names().into_iter().collect(),
            action,
            resource: resource.to_string(),
            prop: prop.map(str::to_string),
            optimized,
        }
    }
}

/// Memoized resolutions. Entries are pure functions of the compiled policies
/// and the key, so concurrent callers may compute the same entry twice; the
/// last insert wins.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<CacheKey, Permission>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Permission>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_compute(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> AuthzResult<Permission>,
    ) -> AuthzResult<Permission> {
        if let Some(hit) = self.entries().get(&key).cloned() {
            return Ok(hit);
        }
        // computed without holding the lock
        let permission = compute()?;
        self.entries().insert(key, permission.clone());
        Ok(permission)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
