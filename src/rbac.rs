//! Role-based access control over verified claims.
//!
//! Requirements are declared as immutable [`PermissionRequirement`] values
//! attached to protected operations; there is no shared default container.
//! Evaluation is a pure function over the claims: all required roles must be
//! present in the requirement's target scope (conjunctive), and the first
//! missing role is reported as the denial reason.

use crate::token::Claims;
use crate::{Error, Result};

/// Roles a protected operation requires, optionally scoped to a specific
/// client. Without an explicit scope the evaluator's default scope (the
/// gateway's own client id) is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequirement {
    roles: Vec<String>,
    scope: Option<String>,
}

impl PermissionRequirement {
    /// Require every role in `roles`.
    #[must_use]
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            scope: None,
        }
    }

    /// Target a specific scope (client id) instead of the evaluator default.
    #[must_use]
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The required roles, in declaration order.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

/// Outcome of a permission evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Every required role is present
    Allow,
    /// A required role is absent; evaluation stopped at the first one
    Deny {
        /// The first missing role
        missing_role: String,
    },
}

/// Decides allow/deny for verified claims against a requirement.
pub struct PermissionEvaluator {
    default_scope: String,
}

impl PermissionEvaluator {
    /// Create an evaluator whose default scope is `client_id`.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            default_scope: client_id.into(),
        }
    }

    /// Evaluate `requirement` against `claims`.
    ///
    /// Role sets are scope-qualified: the lookup targets the requirement's
    /// scope (or the default), and an absent scope reads as an empty set.
    #[must_use]
    pub fn evaluate(&self, claims: &Claims, requirement: &PermissionRequirement) -> Decision {
        let scope = requirement.scope.as_deref().unwrap_or(&self.default_scope);
        let granted = claims.roles_in(scope);

        for required in &requirement.roles {
            if !granted.contains(required) {
                return Decision::Deny {
                    missing_role: required.clone(),
                };
            }
        }
        Decision::Allow
    }

    /// Like [`evaluate`](Self::evaluate), as a `Result` for handler use.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientRole`] naming the first missing role.
    pub fn authorize(&self, claims: &Claims, requirement: &PermissionRequirement) -> Result<()> {
        match self.evaluate(claims, requirement) {
            Decision::Allow => Ok(()),
            Decision::Deny { missing_role } => Err(Error::InsufficientRole(missing_role)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn claims_with(scope: &str, roles: &[&str]) -> Claims {
        serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "http://keycloak:8080/realms/master",
            "exp": 4_102_444_800_u64,
            "resource_access": { scope: { "roles": roles } }
        }))
        .expect("valid claims document")
    }

    #[test]
    fn single_role_allowed_when_granted() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("gateway-client", &["admin"]);
        let requirement = PermissionRequirement::new(["admin"]);
        assert_eq!(evaluator.evaluate(&claims, &requirement), Decision::Allow);
    }

    #[test]
    fn single_role_denied_when_absent() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("gateway-client", &["user"]);
        let requirement = PermissionRequirement::new(["admin"]);
        assert_eq!(
            evaluator.evaluate(&claims, &requirement),
            Decision::Deny {
                missing_role: "admin".to_string()
            }
        );
    }

    #[test]
    fn multiple_roles_are_conjunctive() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let requirement = PermissionRequirement::new(["admin", "operator"]);

        let both = claims_with("gateway-client", &["operator", "admin"]);
        assert_eq!(evaluator.evaluate(&both, &requirement), Decision::Allow);

        // One of two granted is not enough.
        let only_admin = claims_with("gateway-client", &["admin"]);
        assert_eq!(
            evaluator.evaluate(&only_admin, &requirement),
            Decision::Deny {
                missing_role: "operator".to_string()
            }
        );
    }

    #[test]
    fn denial_reports_the_first_missing_role() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("gateway-client", &[]);
        let requirement = PermissionRequirement::new(["admin", "operator"]);
        assert_eq!(
            evaluator.evaluate(&claims, &requirement),
            Decision::Deny {
                missing_role: "admin".to_string()
            }
        );
    }

    #[test]
    fn roles_in_another_scope_do_not_count() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("other-client", &["admin"]);
        let requirement = PermissionRequirement::new(["admin"]);
        assert_eq!(
            evaluator.evaluate(&claims, &requirement),
            Decision::Deny {
                missing_role: "admin".to_string()
            }
        );
    }

    #[test]
    fn explicit_scope_overrides_the_default() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("other-client", &["auditor"]);
        let requirement = PermissionRequirement::new(["auditor"]).in_scope("other-client");
        assert_eq!(evaluator.evaluate(&claims, &requirement), Decision::Allow);
    }

    #[test]
    fn empty_requirement_always_allows() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("gateway-client", &[]);
        let requirement = PermissionRequirement::new(Vec::<String>::new());
        assert_eq!(evaluator.evaluate(&claims, &requirement), Decision::Allow);
    }

    #[test]
    fn authorize_surfaces_the_missing_role() {
        let evaluator = PermissionEvaluator::new("gateway-client");
        let claims = claims_with("gateway-client", &["user"]);
        let requirement = PermissionRequirement::new(["admin"]);
        let err = evaluator.authorize(&claims, &requirement).unwrap_err();
        assert!(matches!(err, Error::InsufficientRole(role) if role == "admin"));
    }
}
