//! Capabilities and the bundles that group them

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};

use super::user::Role;

/// A named permission on the Book entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CanView,
    CanCreate,
    CanEdit,
    CanDelete,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::CanView,
        Capability::CanCreate,
        Capability::CanEdit,
        Capability::CanDelete,
    ];

    pub fn codename(&self) -> &'static str {
        match self {
            Capability::CanView => "can_view",
            Capability::CanCreate => "can_create",
            Capability::CanEdit => "can_edit",
            Capability::CanDelete => "can_delete",
        }
    }

    /// Human readable verb used in denial messages
    pub fn verb(&self) -> &'static str {
        match self {
            Capability::CanView => "view",
            Capability::CanCreate => "create",
            Capability::CanEdit => "edit",
            Capability::CanDelete => "delete",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.codename())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "can_view" => Ok(Capability::CanView),
            "can_create" => Ok(Capability::CanCreate),
            "can_edit" => Ok(Capability::CanEdit),
            "can_delete" => Ok(Capability::CanDelete),
            _ => Err(format!("Unknown capability: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for Capability {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for Capability {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for Capability {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.codename(), buf)
    }
}

/// Ordered set of capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn extend(&mut self, other: &CapabilitySet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A named capability bundle attached to one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    pub role: Role,
    pub capabilities: CapabilitySet,
}

impl Bundle {
    pub fn new(name: &str, role: Role, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            role,
            capabilities: capabilities.iter().copied().collect(),
        }
    }

    /// Viewers, Editors and Admins
    pub fn defaults() -> Vec<Bundle> {
        use Capability::*;
        vec![
            Bundle::new("Viewers", Role::Member, &[CanView]),
            Bundle::new("Editors", Role::Librarian, &[CanView, CanCreate, CanEdit]),
            Bundle::new("Admins", Role::Admin, &[CanView, CanCreate, CanEdit, CanDelete]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_codenames_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(capability.codename().parse::<Capability>(), Ok(capability));
        }
        assert!("can_fly".parse::<Capability>().is_err());
    }

    #[test]
    fn capability_set_serializes_as_codenames() {
        let set: CapabilitySet = [Capability::CanEdit, Capability::CanView].into_iter().collect();
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["can_view","can_edit"]"#);
    }

    #[test]
    fn default_bundles() {
        let bundles = Bundle::defaults();
        let editors = bundles.iter().find(|b| b.name == "Editors").unwrap();
        assert_eq!(editors.role, Role::Librarian);
        assert!(editors.capabilities.contains(Capability::CanEdit));
        assert!(!editors.capabilities.contains(Capability::CanDelete));

        let admins = bundles.iter().find(|b| b.name == "Admins").unwrap();
        assert_eq!(admins.capabilities, CapabilitySet::all());
    }
}
