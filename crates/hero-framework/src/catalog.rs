//! Where extensions are looked up.
//!
//! Two catalogs are consulted, in order:
//!
//! 1. **Local**: descriptors registered on the runtime by the bot project.
//! 2. **Bundled**: descriptors shipped with the framework or linked-in crates,
//!    collected from the [`BUNDLED_EXTENSIONS`] distributed slice.
//!
//! A local extension shadows a bundled one of the same name. Within one
//! catalog the first descriptor of a name wins and duplicates are logged.

use linkme::distributed_slice;
use tracing::warn;

use crate::extension::ExtensionDescriptor;

/// Extensions bundled into the binary.
///
/// Crates contribute entries with
/// `#[distributed_slice(hero_framework::BUNDLED_EXTENSIONS)]`.
#[distributed_slice]
pub static BUNDLED_EXTENSIONS: [ExtensionDescriptor];

/// Which catalog an extension came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionSource {
    Local,
    Bundled,
}

/// The local catalog plus a view of the bundled one.
#[derive(Debug, Default)]
pub struct ExtensionCatalog {
    local: Vec<ExtensionDescriptor>,
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project-local descriptor.
    ///
    /// Returns `false` (and keeps the earlier one) if the name is taken.
    pub fn register(&mut self, descriptor: ExtensionDescriptor) -> bool {
        if self.local.iter().any(|d| d.name == descriptor.name) {
            warn!(
                extension = descriptor.name,
                "Extension registered twice, keeping the first registration"
            );
            return false;
        }
        self.local.push(descriptor);
        true
    }

    /// Finds `name`, local catalog first.
    pub fn resolve(&self, name: &str) -> Option<(ExtensionDescriptor, ExtensionSource)> {
        if let Some(descriptor) = self.local.iter().find(|d| d.name == name) {
            return Some((*descriptor, ExtensionSource::Local));
        }

        let mut bundled = BUNDLED_EXTENSIONS.iter().filter(|d| d.name == name);
        let first = bundled.next()?;
        let duplicates = bundled.count();
        if duplicates > 0 {
            warn!(
                extension = name,
                count = duplicates + 1,
                "Multiple bundled extensions share a name, using first"
            );
        }
        Some((*first, ExtensionSource::Bundled))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Every known extension name, local first, without duplicates.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for descriptor in self.local.iter().chain(BUNDLED_EXTENSIONS.iter()) {
            if !names.contains(&descriptor.name) {
                names.push(descriptor.name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_descriptor_is_found_first() {
        let mut catalog = ExtensionCatalog::new();
        catalog.register(ExtensionDescriptor::new("essentials").description("local copy"));

        let (descriptor, source) = catalog.resolve("essentials").unwrap();
        assert_eq!(source, ExtensionSource::Local);
        assert_eq!(descriptor.description, "local copy");
    }

    #[test]
    fn duplicate_local_registration_keeps_the_first() {
        let mut catalog = ExtensionCatalog::new();
        assert!(catalog.register(ExtensionDescriptor::new("fun").description("first")));
        assert!(!catalog.register(ExtensionDescriptor::new("fun").description("second")));
        assert_eq!(catalog.resolve("fun").unwrap().0.description, "first");
    }

    #[test]
    fn unknown_extension_does_not_resolve() {
        assert!(ExtensionCatalog::new().resolve("nonexistent").is_none());
    }

    #[cfg(feature = "builtin-extensions")]
    #[test]
    fn essentials_is_bundled() {
        let catalog = ExtensionCatalog::new();
        let (_, source) = catalog.resolve("essentials").unwrap();
        assert_eq!(source, ExtensionSource::Bundled);
        assert!(catalog.names().contains(&"essentials"));
    }
}
