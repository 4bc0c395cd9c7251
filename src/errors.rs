use std::fmt;

use crate::authz::Action;

pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(thiserror::Error, Debug)]
pub enum AuthzError {
    /// Policies were used before compilation, or a declaration is malformed.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    /// A condition needing an object instance was evaluated without one.
    #[error("missing context: {condition} requires an object to evaluate")]
    MissingContext { condition: String },
    #[error("{0}")]
    AccessDenied(AccessDenied),
    /// Calculated data reached database codegen.
    #[error("codegen invariant violated: {0}")]
    CodegenInvariant(String),
}

impl AuthzError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unknown_resource(name: impl Into<String>) -> Self {
        Self::UnknownResource(name.into())
    }

    pub fn missing_context(condition: impl Into<String>) -> Self {
        Self::MissingContext {
            condition: condition.into(),
        }
    }

    pub fn access_denied(resource: impl Into<String>, prop: Option<&str>, action: Action) -> Self {
        Self::AccessDenied(AccessDenied {
            resource: resource.into(),
            prop: prop.map(str::to_string),
            action,
        })
    }

    pub fn codegen_invariant(message: impl Into<String>) -> Self {
        Self::CodegenInvariant(message.into())
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

/// Context for a denied check, kept structured so callers can build their own
/// user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub resource: String,
    pub prop: Option<String>,
    pub action: Action,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prop {
            Some(prop) => write!(
                f,
                "you do not have permission to {} {}.{}",
                self.action, self.resource, prop
            ),
            None => write!(
                f,
                "you do not have permission to {} this {}",
                self.action, self.resource
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_message_names_prop() {
        let err = AuthzError::access_denied("Project", Some("budget"), Action::Edit);
        assert_eq!(
            err.to_string(),
            "you do not have permission to edit Project.budget"
        );
        assert!(err.is_access_denied());
    }

    #[test]
    fn access_denied_message_without_prop() {
        let err = AuthzError::access_denied("Task", None, Action::Delete);
        assert_eq!(err.to_string(), "you do not have permission to delete this Task");
    }
}
