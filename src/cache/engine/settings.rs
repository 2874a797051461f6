//! Per-call cache settings
//!
//! Settings name the cache item, gate whether the result is committed, and
//! carry expiration, priority and dependency metadata. Construction goes
//! through the builder; an item name is mandatory, either explicit or
//! derived from ordered name parts.
//!
//! Dependency keys may be supplied eagerly or as a lazy provider. The
//! provider runs at most once, and only when a loaded value is actually
//! committed, so a hit never pays for dependency construction.

use crate::cache::types::{CacheOperationError, CachePriority};

/// Separator for derived item names
const NAME_PART_SEPARATOR: char = '|';

/// Dependency keys for a cache entry, eager or deferred
pub enum DependencySource {
    /// No dependencies
    None,
    /// Keys known up front
    Eager(Vec<String>),
    /// Keys computed only if the value is committed
    Lazy(Box<dyn FnOnce() -> Vec<String> + Send>),
}

impl std::fmt::Debug for DependencySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "DependencySource::None"),
            Self::Eager(keys) => f.debug_tuple("DependencySource::Eager").field(keys).finish(),
            Self::Lazy(_) => write!(f, "DependencySource::Lazy(..)"),
        }
    }
}

impl DependencySource {
    /// Evaluate the source, consuming it
    pub(crate) fn resolve(self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Eager(keys) => keys,
            Self::Lazy(provider) => provider(),
        }
    }
}

/// Derive a canonical item name from ordered parts
///
/// Parts are joined with `|` and lower-cased; item names are
/// case-insensitive throughout the engine.
pub fn item_name_from_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut name = String::new();
    for part in parts {
        if !name.is_empty() {
            name.push(NAME_PART_SEPARATOR);
        }
        name.push_str(part.as_ref());
    }
    name.to_lowercase()
}

/// Per-call settings for [`get_or_compute`](crate::cache::engine::CacheEngine::get_or_compute)
#[derive(Debug)]
pub struct CacheSettings {
    item_name: String,
    cache_minutes: f64,
    sliding: bool,
    condition: bool,
    priority: CachePriority,
    allow_progressive: bool,
    dependencies: DependencySource,
}

impl CacheSettings {
    /// Start building settings for the given cache duration in minutes
    ///
    /// A duration of zero or less disables caching for the call.
    pub fn builder(cache_minutes: f64) -> CacheSettingsBuilder {
        CacheSettingsBuilder {
            item_name: None,
            cache_minutes,
            sliding: false,
            condition: true,
            priority: CachePriority::Normal,
            allow_progressive: true,
            dependencies: DependencySource::None,
        }
    }

    /// Canonical (lower-cased) item name
    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn cache_minutes(&self) -> f64 {
        self.cache_minutes
    }

    pub fn sliding(&self) -> bool {
        self.sliding
    }

    pub fn priority(&self) -> CachePriority {
        self.priority
    }

    pub fn allow_progressive(&self) -> bool {
        self.allow_progressive
    }

    /// Whether this call commits its result to the store
    ///
    /// Caching is active only when the caller's condition holds and the
    /// duration is positive.
    pub fn is_cached(&self) -> bool {
        self.condition && self.cache_minutes > 0.0
    }

    /// Consume the settings, yielding the dependency keys
    pub(crate) fn into_dependencies(self) -> Vec<String> {
        self.dependencies.resolve()
    }
}

/// Builder for [`CacheSettings`]
#[derive(Debug)]
pub struct CacheSettingsBuilder {
    item_name: Option<String>,
    cache_minutes: f64,
    sliding: bool,
    condition: bool,
    priority: CachePriority,
    allow_progressive: bool,
    dependencies: DependencySource,
}

impl CacheSettingsBuilder {
    /// Explicit item name; lower-cased on the way in
    pub fn item_name(mut self, name: impl AsRef<str>) -> Self {
        self.item_name = Some(name.as_ref().to_lowercase());
        self
    }

    /// Derive the item name from ordered parts
    pub fn name_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.item_name = Some(item_name_from_parts(parts));
        self
    }

    /// Use sliding instead of absolute expiration
    pub fn sliding(mut self, sliding: bool) -> Self {
        self.sliding = sliding;
        self
    }

    /// Caller-evaluated gate; caching is skipped when false
    pub fn condition(mut self, condition: bool) -> Self {
        self.condition = condition;
        self
    }

    pub fn priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Opt this call out of progressive caching
    pub fn allow_progressive(mut self, allow: bool) -> Self {
        self.allow_progressive = allow;
        self
    }

    /// Dependency keys known up front
    pub fn dependencies<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dependencies = DependencySource::Eager(
            keys.into_iter()
                .map(|key| key.as_ref().to_lowercase())
                .collect(),
        );
        self
    }

    /// Dependency keys computed only if the value is committed
    pub fn lazy_dependencies(
        mut self,
        provider: impl FnOnce() -> Vec<String> + Send + 'static,
    ) -> Self {
        self.dependencies = DependencySource::Lazy(Box::new(move || {
            provider().into_iter().map(|key| key.to_lowercase()).collect()
        }));
        self
    }

    pub fn build(self) -> Result<CacheSettings, CacheOperationError> {
        let item_name = match self.item_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(CacheOperationError::configuration_error(
                    "cache settings require a non-empty item name",
                ));
            }
        };
        Ok(CacheSettings {
            item_name,
            cache_minutes: self.cache_minutes,
            sliding: self.sliding,
            condition: self.condition,
            priority: self.priority,
            allow_progressive: self.allow_progressive,
            dependencies: self.dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parts_are_joined_and_lowercased() {
        assert_eq!(
            item_name_from_parts(["Node", "42", "Children"]),
            "node|42|children"
        );
        assert_eq!(item_name_from_parts(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_missing_name_is_rejected() {
        assert!(matches!(
            CacheSettings::builder(10.0).build(),
            Err(CacheOperationError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_cached_gate() {
        let cached = CacheSettings::builder(10.0)
            .item_name("a")
            .build()
            .expect("valid settings");
        assert!(cached.is_cached());

        let zero_minutes = CacheSettings::builder(0.0)
            .item_name("a")
            .build()
            .expect("valid settings");
        assert!(!zero_minutes.is_cached());

        let gated_off = CacheSettings::builder(10.0)
            .item_name("a")
            .condition(false)
            .build()
            .expect("valid settings");
        assert!(!gated_off.is_cached());
    }

    #[test]
    fn test_lazy_dependencies_resolve_on_demand() {
        let settings = CacheSettings::builder(5.0)
            .item_name("a")
            .lazy_dependencies(|| vec!["Node|1".to_string(), "Node|2".to_string()])
            .build()
            .expect("valid settings");
        assert_eq!(settings.into_dependencies(), vec!["node|1", "node|2"]);
    }
}
