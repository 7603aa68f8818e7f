//! Organization scope: the tenant partition key ("user code").

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Scope identifier shared by an organization and all of its workers and jobs.
///
/// Both owner kinds (an individual account or a company) resolve to this one
/// value at the boundary; the domain never sees which kind it was.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationScope(String);

impl OrganizationScope {
    /// Build a scope from a raw code. Surrounding whitespace is ignored.
    ///
    /// A blank code means the caller has no scope at all, which is an
    /// authorization failure rather than a validation one.
    pub fn new(code: impl AsRef<str>) -> Result<Self, DomainError> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(DomainError::Unauthorized);
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for OrganizationScope {}

impl core::fmt::Display for OrganizationScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrganizationScope {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrganizationScope> for String {
    fn from(value: OrganizationScope) -> Self {
        value.0
    }
}
