use blockdb_cache::CacheStats;

/// Prefix of read-cache properties answered by every database.
pub const CACHE_PROPERTY_PREFIX: &str = "cache.";

/// Answer a `cache.*` stat property, or `None` if `property` is not one.
pub fn cache_property(stats: &CacheStats, property: &str) -> Option<String> {
    let value = match property.strip_prefix(CACHE_PROPERTY_PREFIX)? {
        "hits" => stats.hits,
        "misses" => stats.misses,
        "loads" => stats.loads,
        "coalesced" => stats.coalesced,
        "evictions" => stats.evictions,
        _ => return None,
    };
    Some(value.to_string())
}
