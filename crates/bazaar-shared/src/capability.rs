//! Role flags and capability checks.
//!
//! Two combinators exist and they are the only places access precedence is
//! decided:
//!
//! - [`authorize`]: the caller holds **any** of the required capabilities
//! - [`authorize_ownership`]: the caller **owns** the resource, or is an admin

use serde::{Deserialize, Serialize};

use crate::error::AccessError;
use crate::token::Claims;

// ---------------------------------------------------------------------------
// Role flags
// ---------------------------------------------------------------------------

/// The three role flags carried by a user record and by every token.
///
/// `is_supplier` and `is_customer` are toggled together by
/// [`RoleFlags::flip_supplier_customer`]; `is_admin` never changes there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_supplier: bool,
    #[serde(default)]
    pub is_customer: bool,
}

impl RoleFlags {
    /// Flags of a freshly registered account.
    pub fn customer() -> Self {
        Self {
            is_admin: false,
            is_supplier: false,
            is_customer: true,
        }
    }

    pub fn admin() -> Self {
        Self {
            is_admin: true,
            is_supplier: false,
            is_customer: false,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Admin => self.is_admin,
            Capability::Supplier => self.is_supplier,
            Capability::Customer => self.is_customer,
        }
    }

    /// supplier -> customer, anything else -> supplier.
    pub fn flip_supplier_customer(self) -> Self {
        let to_supplier = !self.is_supplier;
        Self {
            is_admin: self.is_admin,
            is_supplier: to_supplier,
            is_customer: !to_supplier,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Admin,
    Supplier,
    Customer,
}

impl Capability {
    fn bit(self) -> u8 {
        match self {
            Capability::Admin => 0b001,
            Capability::Supplier => 0b010,
            Capability::Customer => 0b100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Admin => "is_admin",
            Capability::Supplier => "is_supplier",
            Capability::Customer => "is_customer",
        }
    }
}

/// A required-capability set. Satisfied when the caller holds any member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const ADMIN: Self = Self(0b001);
    pub const CUSTOMER: Self = Self(0b100);
    pub const SUPPLIER_OR_ADMIN: Self = Self(0b011);

    pub fn of(capabilities: &[Capability]) -> Self {
        Self(capabilities.iter().fold(0, |acc, c| acc | c.bit()))
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        [Capability::Admin, Capability::Supplier, Capability::Customer]
            .into_iter()
            .filter(move |c| self.contains(*c))
    }

    /// Whether `roles` intersects this set. An empty set grants nothing.
    pub fn is_satisfied_by(&self, roles: &RoleFlags) -> bool {
        self.iter().any(|c| roles.has(c))
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Grant iff at least one of the caller's role flags is in `required`.
pub fn authorize<'a>(claims: &'a Claims, required: CapabilitySet) -> Result<&'a Claims, AccessError> {
    if required.is_satisfied_by(&claims.roles) {
        Ok(claims)
    } else {
        Err(AccessError::Forbidden(format!(
            "requires one of {required}"
        )))
    }
}

/// Grant iff the caller owns the resource or holds `is_admin`.
pub fn authorize_ownership(claims: &Claims, resource_owner_id: i64) -> Result<(), AccessError> {
    if claims.roles.is_admin || claims.user_id == resource_owner_id {
        Ok(())
    } else {
        Err(AccessError::Forbidden(
            "not the owner of this resource".to_string(),
        ))
    }
}
