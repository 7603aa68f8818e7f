//! Caller scope threaded into every engine operation.

use shiftmatch_core::OrganizationScope;

use crate::error::MatchError;

/// Which kind of account is acting. Both resolve to the same scope value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Individual,
    Company,
}

/// Immutable per-call scope context.
///
/// Built at the boundary from whatever identified the caller. An anonymous
/// context is valid to construct but every operation rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorScope {
    scope: Option<OrganizationScope>,
    owner: Option<OwnerKind>,
}

impl ActorScope {
    pub fn new(scope: OrganizationScope) -> Self {
        Self {
            scope: Some(scope),
            owner: None,
        }
    }

    /// Resolve an owner's user code. A blank code yields an anonymous context.
    pub fn for_owner(owner: OwnerKind, user_code: &str) -> Self {
        Self {
            scope: OrganizationScope::new(user_code).ok(),
            owner: Some(owner),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            scope: None,
            owner: None,
        }
    }

    pub fn owner(&self) -> Option<OwnerKind> {
        self.owner
    }

    pub fn scope(&self) -> Result<&OrganizationScope, MatchError> {
        self.scope.as_ref().ok_or(MatchError::Unauthorized)
    }
}

impl From<OrganizationScope> for ActorScope {
    fn from(value: OrganizationScope) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_owner_kinds_resolve_to_the_same_scope() {
        let individual = ActorScope::for_owner(OwnerKind::Individual, "COMP1");
        let company = ActorScope::for_owner(OwnerKind::Company, " COMP1 ");
        assert_eq!(individual.scope().unwrap(), company.scope().unwrap());
        assert_eq!(company.owner(), Some(OwnerKind::Company));
    }

    #[test]
    fn missing_scope_is_unauthorized() {
        assert_eq!(ActorScope::anonymous().scope(), Err(MatchError::Unauthorized));
        assert_eq!(
            ActorScope::for_owner(OwnerKind::Company, "  ").scope(),
            Err(MatchError::Unauthorized)
        );
    }
}
