//! Type keys and the compatibility table used for fallback matching

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Identifies the concrete kind of a pooled entity ("Bolt", "Fireball", ...).
///
/// Cloning is cheap; the name is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", &self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TypeKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TypeKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(TypeKey::from)
    }
}

/// Declared subtype relations between type keys, resolved at startup.
///
/// Two keys are compatible when they are equal or when either one is a
/// (transitive) subtype of the other. The pool only consults this table when
/// the exact sub-pool has nothing available.
///
/// # Examples
///
/// ```
/// use esox_entitypool::{CompatibilityTable, TypeKey};
///
/// let table = CompatibilityTable::new()
///     .with_subtype("Fireball", "Bolt")
///     .with_subtype("Meteor", "Fireball");
///
/// assert!(table.is_subtype_of(&TypeKey::new("Meteor"), &TypeKey::new("Bolt")));
/// assert!(table.is_compatible(&TypeKey::new("Bolt"), &TypeKey::new("Meteor")));
/// assert!(!table.is_compatible(&TypeKey::new("Bolt"), &TypeKey::new("Beam")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompatibilityTable {
    /// child -> direct parents
    parents: BTreeMap<TypeKey, BTreeSet<TypeKey>>,
}

impl CompatibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` a direct subtype of `parent`
    pub fn with_subtype(mut self, child: impl Into<TypeKey>, parent: impl Into<TypeKey>) -> Self {
        self.add_subtype(child, parent);
        self
    }

    pub fn add_subtype(&mut self, child: impl Into<TypeKey>, parent: impl Into<TypeKey>) {
        let (child, parent) = (child.into(), parent.into());
        if child != parent {
            self.parents.entry(child).or_default().insert(parent);
        }
    }

    /// Whether `child` reaches `ancestor` through declared parent links.
    /// A key is not its own subtype.
    pub fn is_subtype_of(&self, child: &TypeKey, ancestor: &TypeKey) -> bool {
        let mut visited = BTreeSet::new();
        let mut pending = vec![child];

        while let Some(current) = pending.pop() {
            let Some(parents) = self.parents.get(current) else {
                continue;
            };
            for parent in parents {
                if parent == ancestor {
                    return true;
                }
                if visited.insert(parent) {
                    pending.push(parent);
                }
            }
        }
        false
    }

    pub fn is_compatible(&self, candidate: &TypeKey, requested: &TypeKey) -> bool {
        candidate == requested
            || self.is_subtype_of(candidate, requested)
            || self.is_subtype_of(requested, candidate)
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_keys_are_compatible() {
        let table = CompatibilityTable::new();
        assert!(table.is_compatible(&"Bolt".into(), &"Bolt".into()));
        assert!(!table.is_subtype_of(&"Bolt".into(), &"Bolt".into()));
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        let table = CompatibilityTable::new().with_subtype("Fireball", "Bolt");
        let (bolt, fireball) = (TypeKey::new("Bolt"), TypeKey::new("Fireball"));

        assert!(table.is_compatible(&fireball, &bolt));
        assert!(table.is_compatible(&bolt, &fireball));
        assert!(!table.is_subtype_of(&bolt, &fireball));
    }

    #[test]
    fn test_cycles_terminate() {
        let table = CompatibilityTable::new()
            .with_subtype("A", "B")
            .with_subtype("B", "A");

        assert!(table.is_subtype_of(&"A".into(), &"B".into()));
        assert!(!table.is_subtype_of(&"A".into(), &"C".into()));
    }

    #[test]
    fn test_self_parent_is_ignored() {
        let table = CompatibilityTable::new().with_subtype("Bolt", "Bolt");
        assert!(table.is_empty());
    }
}
