//! Pool configuration options

use crate::type_key::{CompatibilityTable, TypeKey};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builds the payload for a requested type key. Returning `None` means the
/// factory cannot produce that kind right now.
pub type Factory<T> = Arc<dyn Fn(&TypeKey) -> Option<T> + Send + Sync>;

/// Plain-data part of the configuration, loadable from a game's own config
/// files when the `serde` feature is on.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolSettings {
    /// Entities created per type at warm-up and on the first request for an
    /// unknown type
    pub initial_capacity: usize,

    /// Whether `acquire` may grow an exhausted sub-pool
    pub can_grow: bool,

    /// Entities added per automatic growth event
    pub growth_increment: usize,

    /// Minimum time an entity stays available before it is handed out again
    pub min_reuse_delay: Option<Duration>,

    /// Types pre-warmed when the pool is created
    pub warmup_types: Vec<TypeKey>,

    /// Type used by `acquire_default`; falls back to the first warm-up type
    pub default_type: Option<TypeKey>,

    /// Subtype declarations used for fallback matching
    pub compatibility: CompatibilityTable,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 20,
            can_grow: true,
            growth_increment: 5,
            min_reuse_delay: None,
            warmup_types: Vec::new(),
            default_type: None,
            compatibility: CompatibilityTable::default(),
        }
    }
}

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use esox_entitypool::PoolConfiguration;
///
/// struct Bolt;
/// impl esox_entitypool::Poolable for Bolt {}
///
/// let config = PoolConfiguration::<Bolt>::new()
///     .with_initial_capacity(2)
///     .with_growth(1)
///     .with_warmup_types(["Bolt"])
///     .with_factory(|_key| Some(Bolt));
///
/// assert_eq!(config.settings.initial_capacity, 2);
/// assert_eq!(config.settings.growth_increment, 1);
/// assert!(config.settings.can_grow);
/// ```
pub struct PoolConfiguration<T> {
    pub settings: PoolSettings,
    factory: Option<Factory<T>>,
    factories: HashMap<TypeKey, Factory<T>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self::from_settings(PoolSettings::default())
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: PoolSettings) -> Self {
        Self {
            settings,
            factory: None,
            factories: HashMap::new(),
        }
    }

    pub fn with_initial_capacity(mut self, count: usize) -> Self {
        self.settings.initial_capacity = count;
        self
    }

    /// Allow automatic growth by `increment` entities per event
    pub fn with_growth(mut self, increment: usize) -> Self {
        self.settings.can_grow = true;
        self.settings.growth_increment = increment;
        self
    }

    /// Disable automatic growth; `grow` still works
    pub fn without_growth(mut self) -> Self {
        self.settings.can_grow = false;
        self
    }

    pub fn with_min_reuse_delay(mut self, delay: Duration) -> Self {
        self.settings.min_reuse_delay = Some(delay);
        self
    }

    pub fn with_warmup_types<I, K>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TypeKey>,
    {
        self.settings.warmup_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_type(mut self, key: impl Into<TypeKey>) -> Self {
        self.settings.default_type = Some(key.into());
        self
    }

    /// Declare `child` a subtype of `parent` for fallback matching
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_entitypool::{PoolConfiguration, TypeKey};
    ///
    /// struct Spell;
    /// impl esox_entitypool::Poolable for Spell {}
    ///
    /// let config = PoolConfiguration::<Spell>::new().with_subtype("Fireball", "Bolt");
    /// assert!(config
    ///     .settings
    ///     .compatibility
    ///     .is_compatible(&TypeKey::new("Bolt"), &TypeKey::new("Fireball")));
    /// ```
    pub fn with_subtype(mut self, child: impl Into<TypeKey>, parent: impl Into<TypeKey>) -> Self {
        self.settings.compatibility.add_subtype(child, parent);
        self
    }

    pub fn with_compatibility(mut self, table: CompatibilityTable) -> Self {
        self.settings.compatibility = table;
        self
    }

    /// Factory used for every type without a dedicated one
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&TypeKey) -> Option<T> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Factory dedicated to one type key
    pub fn with_factory_for<F>(mut self, key: impl Into<TypeKey>, factory: F) -> Self
    where
        F: Fn(&TypeKey) -> Option<T> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
        self
    }

    pub fn factory_for(&self, key: &TypeKey) -> Option<&Factory<T>> {
        self.factories.get(key).or(self.factory.as_ref())
    }

    /// Explicit default type, else the first warm-up type
    pub fn default_type(&self) -> Option<&TypeKey> {
        self.settings
            .default_type
            .as_ref()
            .or_else(|| self.settings.warmup_types.first())
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dedicated: Vec<_> = self.factories.keys().collect();
        dedicated.sort();
        f.debug_struct("PoolConfiguration")
            .field("settings", &self.settings)
            .field("has_default_factory", &self.factory.is_some())
            .field("dedicated_factories", &dedicated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let settings = PoolSettings::default();
        assert_eq!(settings.initial_capacity, 20);
        assert!(settings.can_grow);
        assert_eq!(settings.growth_increment, 5);
        assert_eq!(settings.min_reuse_delay, None);
    }

    #[test]
    fn test_dedicated_factory_wins() {
        let config = PoolConfiguration::<u32>::new()
            .with_factory(|_| Some(1))
            .with_factory_for("Beam", |_| Some(2));

        let beam = TypeKey::new("Beam");
        let bolt = TypeKey::new("Bolt");
        assert_eq!(config.factory_for(&beam).and_then(|f| f(&beam)), Some(2));
        assert_eq!(config.factory_for(&bolt).and_then(|f| f(&bolt)), Some(1));
    }

    #[test]
    fn test_default_type_falls_back_to_first_warmup_type() {
        let config = PoolConfiguration::<u32>::new().with_warmup_types(["Bolt", "Beam"]);
        assert_eq!(config.default_type(), Some(&TypeKey::new("Bolt")));

        let config = config.with_default_type("Beam");
        assert_eq!(config.default_type(), Some(&TypeKey::new("Beam")));
    }

    #[test]
    fn test_without_growth() {
        let config = PoolConfiguration::<u32>::new().without_growth();
        assert!(!config.settings.can_grow);
    }

    #[test]
    fn test_settings_survive_from_settings() {
        let settings = PoolConfiguration::<u32>::new()
            .with_initial_capacity(3)
            .with_subtype("FireBolt", "Bolt")
            .settings;

        let rebuilt = PoolConfiguration::<u32>::from_settings(settings.clone());
        assert_eq!(rebuilt.settings, settings);
        assert_ne!(rebuilt.settings, PoolSettings::default());
    }
}
