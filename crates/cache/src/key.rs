use std::fmt;

/// Identity of a cached archive: the collection it belongs to and the URL of
/// the resource inside that collection.
///
/// Two keys are equal only if both parts are equal; the same URL in two
/// collections is cached twice. Keys order by collection, then URL, which is
/// the tie-break used when choosing eviction victims.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    collection_id: String,
    url: String,
}
impl CacheKey {
    pub fn new(collection_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            url: url.into(),
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.collection_id, self.url)
    }
}
