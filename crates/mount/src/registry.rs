//! Extension → provider registry.

use crate::provider::{ArcProvider, TarProvider, WarcProvider, ZipProvider};
use crate::{ArchiveFormat, ArchiveKind, ProviderHandle};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An archive kind together with the provider that can mount it.
#[derive(Clone)]
pub struct Resolved {
    pub kind: ArchiveKind,
    pub provider: ProviderHandle,
}
impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved").field("kind", &self.kind).field("provider", &self.provider.name()).finish()
    }
}

/// Maps archive formats to the providers that mount them.
///
/// [`Registry::default()`] knows every built-in format. Resources whose
/// hints resolve to a format without a registered provider are treated as
/// "not an archive".
///
/// # Examples
///
/// ```
/// use arcache_mount::{ArchiveFormat, Registry};
///
/// let registry = Registry::default();
/// let resolved = registry.resolve(Some("bundle.tar.gz"), None).unwrap();
/// assert_eq!(resolved.kind.format, ArchiveFormat::Tar);
/// assert!(registry.resolve(Some("page.html"), Some("text/html")).is_none());
/// ```
#[derive(Clone)]
pub struct Registry {
    providers: BTreeMap<ArchiveFormat, ProviderHandle>,
}
impl Registry {
    /// A registry with no providers; nothing resolves.
    pub fn empty() -> Self {
        Self { providers: BTreeMap::new() }
    }

    /// Register (or replace) the provider for a format.
    pub fn with_provider(mut self, format: ArchiveFormat, provider: ProviderHandle) -> Self {
        self.providers.insert(format, provider);
        self
    }

    pub fn formats(&self) -> impl Iterator<Item = ArchiveFormat> + '_ {
        self.providers.keys().copied()
    }

    /// Resolve an archive kind and provider from an extension hint, falling
    /// back to the content type when the hint is unknown or its format has no
    /// provider. Returns `None` for anything that isn't a mountable archive.
    pub fn resolve(&self, extension_hint: Option<&str>, content_type: Option<&str>) -> Option<Resolved> {
        extension_hint
            .and_then(ArchiveKind::from_hint)
            .and_then(|kind| self.with_kind(kind))
            .or_else(|| content_type.and_then(ArchiveKind::from_content_type).and_then(|kind| self.with_kind(kind)))
    }

    fn with_kind(&self, kind: ArchiveKind) -> Option<Resolved> {
        let provider = self.providers.get(&kind.format)?.clone();
        Some(Resolved { kind, provider })
    }
}
impl Default for Registry {
    fn default() -> Self {
        Self::empty()
            .with_provider(ArchiveFormat::Zip, Arc::new(ZipProvider))
            .with_provider(ArchiveFormat::Tar, Arc::new(TarProvider))
            .with_provider(ArchiveFormat::Warc, Arc::new(WarcProvider))
            .with_provider(ArchiveFormat::Arc, Arc::new(ArcProvider))
    }
}
