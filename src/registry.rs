//! Transport plugin registry.
//!
//! Plugins are looked up by name. A registry declares a set of lookup names
//! (`"raw_pub"`, `"compressed_pub"`, ...) and can instantiate any of them,
//! reporting failure as a [`PluginLoadError`] instead of panicking.
//!
//! [`PluginLoader`] is the concrete registry: a registration table filled in
//! at startup. A name may be *declared* without a factory, which models a
//! transport that is known to exist but is not linked into this build.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::transport::create_raw_plugin;
use crate::{log_debug, PluginLoadError, PublisherPluginPtr};

/// Marker appended to a transport id to form its registry lookup name.
pub const PUBLISHER_SUFFIX: &str = "_pub";

/// Canonical transport id for a registry lookup name.
///
/// The suffix is only removed when it really is a suffix; other names are
/// returned unchanged.
pub fn canonical_transport_id(lookup_name: &str) -> &str {
    lookup_name
        .strip_suffix(PUBLISHER_SUFFIX)
        .unwrap_or(lookup_name)
}

/// Registry lookup name for a canonical transport id.
pub fn lookup_name(transport_id: &str) -> String {
    format!("{transport_id}{PUBLISHER_SUFFIX}")
}

/// Factory producing a fresh plugin instance.
///
/// An `Err` carries the reason construction failed.
pub type PluginFactory =
    Arc<dyn Fn() -> std::result::Result<PublisherPluginPtr, String> + Send + Sync>;

/// Plugin registry abstraction.
pub trait PluginRegistry: Send + Sync {
    // ---
    /// Every declared lookup name.
    fn declared_classes(&self) -> Vec<String>;

    /// Build a new instance of the plugin declared as `lookup_name`.
    fn instantiate(
        &self,
        lookup_name: &str,
    ) -> std::result::Result<PublisherPluginPtr, PluginLoadError>;

    /// Canonical transport ids of all declared plugins, sorted and
    /// deduplicated.
    fn declared_transports(&self) -> Vec<String> {
        // ---
        self.declared_classes()
            .iter()
            .map(|name| canonical_transport_id(name).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Canonical transport ids of the plugins that can actually be built.
    ///
    /// Each plugin is instantiated once and shut down immediately.
    fn loadable_transports(&self) -> Vec<String> {
        // ---
        self.declared_classes()
            .iter()
            .filter(|name| match self.instantiate(name) {
                Ok(plugin) => {
                    plugin.shutdown();
                    true
                }
                Err(_err) => {
                    log_debug!("{name} is declared but not loadable: {_err}");
                    false
                }
            })
            .map(|name| canonical_transport_id(name).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Shared registry pointer.
pub type PluginRegistryPtr = Arc<dyn PluginRegistry>;

/// Registration-table plugin registry.
///
/// # Example
///
/// ```
/// use image_fanout::{PluginLoader, PluginRegistry};
///
/// let loader = PluginLoader::builtin().declare("theora_pub");
///
/// assert_eq!(loader.declared_transports(), vec!["raw", "theora"]);
/// assert_eq!(loader.loadable_transports(), vec!["raw"]);
/// ```
#[derive(Default, Clone)]
pub struct PluginLoader {
    // ---
    entries: BTreeMap<String, Option<PluginFactory>>,
}

impl PluginLoader {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every transport shipped in this crate.
    pub fn builtin() -> Self {
        Self::new().register("raw_pub", || Ok(create_raw_plugin()))
    }

    /// Declare a lookup name without a factory.
    ///
    /// Instantiating it fails with [`PluginLoadError::NotRegistered`].
    /// An existing factory under the same name is kept.
    pub fn declare(mut self, lookup_name: impl Into<String>) -> Self {
        self.entries.entry(lookup_name.into()).or_insert(None);
        self
    }

    /// Register a factory under `lookup_name`, replacing any earlier one.
    pub fn register<F>(mut self, lookup_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> std::result::Result<PublisherPluginPtr, String> + Send + Sync + 'static,
    {
        self.entries
            .insert(lookup_name.into(), Some(Arc::new(factory)));
        self
    }

    /// Wrap the registry in a [`PluginRegistryPtr`].
    pub fn into_ptr(self) -> PluginRegistryPtr {
        Arc::new(self)
    }
}

impl PluginRegistry for PluginLoader {
    fn declared_classes(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn instantiate(
        &self,
        lookup_name: &str,
    ) -> std::result::Result<PublisherPluginPtr, PluginLoadError> {
        // ---
        match self.entries.get(lookup_name) {
            None => Err(PluginLoadError::NotDeclared(lookup_name.into())),
            Some(None) => Err(PluginLoadError::NotRegistered(lookup_name.into())),
            Some(Some(factory)) => factory().map_err(|reason| PluginLoadError::Construction {
                lookup_name: lookup_name.into(),
                reason,
            }),
        }
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: BTreeMap<&str, bool> = self
            .entries
            .iter()
            .map(|(name, factory)| (name.as_str(), factory.is_some()))
            .collect();
        f.debug_struct("PluginLoader")
            .field("entries", &entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_canonical_id_strips_true_suffix_only() {
        // ---
        assert_eq!(canonical_transport_id("raw_pub"), "raw");
        assert_eq!(canonical_transport_id("compressed_pub"), "compressed");
        assert_eq!(canonical_transport_id("raw"), "raw");
        assert_eq!(canonical_transport_id("my_pub_codec"), "my_pub_codec");
        assert_eq!(lookup_name("raw"), "raw_pub");
    }

    #[test]
    fn test_instantiate_errors() {
        // ---
        let loader = PluginLoader::new()
            .declare("missing_pub")
            .register("broken_pub", || Err("codec library not found".into()));

        assert_eq!(
            loader.instantiate("nope_pub").err(),
            Some(PluginLoadError::NotDeclared("nope_pub".into()))
        );
        assert_eq!(
            loader.instantiate("missing_pub").err(),
            Some(PluginLoadError::NotRegistered("missing_pub".into()))
        );
        assert_eq!(
            loader.instantiate("broken_pub").err(),
            Some(PluginLoadError::Construction {
                lookup_name: "broken_pub".into(),
                reason: "codec library not found".into(),
            })
        );
    }

    #[test]
    fn test_builtin_instantiates_raw() {
        // ---
        let loader = PluginLoader::builtin();
        let plugin = loader.instantiate("raw_pub").expect("raw plugin");
        assert_eq!(plugin.transport_name(), "raw");
    }

    #[test]
    fn test_declare_keeps_existing_factory() {
        // ---
        let loader = PluginLoader::builtin().declare("raw_pub");
        assert!(loader.instantiate("raw_pub").is_ok());
    }

    #[test]
    fn test_declared_transports_deduplicates_collisions() {
        // ---
        let loader = PluginLoader::new()
            .declare("foo")
            .declare("foo_pub")
            .declare("bar_pub");

        assert_eq!(loader.declared_classes().len(), 3);
        assert_eq!(loader.declared_transports(), vec!["bar", "foo"]);
    }
}
