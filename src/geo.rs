//! Country lookup for client IPs.
//!
//! The device gate only needs an IP -> ISO country code mapping. It is kept
//! behind a trait so deployments can plug in a real geo database while tests
//! use a fixed table.

use std::sync::Arc;

pub trait GeoResolver: Send + Sync {
    /// Resolve the country code for an IP, None when unknown.
    fn country_for(&self, ip: &str) -> Option<String>;
}

/// Longest-prefix match over configured `"prefix=CC"` entries, e.g.
/// `"203.0.113.=AU"`. Lookup is in-memory and never suspends.
pub struct PrefixGeoResolver {
    // (prefix, country), longest prefixes first
    entries: Vec<(String, String)>,
}

impl PrefixGeoResolver {
    pub fn from_entries(entries: &[String]) -> Self {
        let mut parsed: Vec<(String, String)> = entries
            .iter()
            .filter_map(|entry| {
                let (prefix, country) = entry.split_once('=')?;
                let prefix = prefix.trim();
                let country = country.trim();
                if prefix.is_empty() || country.is_empty() {
                    tracing::warn!("Ignoring malformed country prefix entry '{}'", entry);
                    return None;
                }
                Some((prefix.to_string(), country.to_uppercase()))
            })
            .collect();
        parsed.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries: parsed }
    }
}

impl GeoResolver for PrefixGeoResolver {
    fn country_for(&self, ip: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(prefix, _)| ip.starts_with(prefix.as_str()))
            .map(|(_, country)| country.clone())
    }
}

/// Resolver that maps every IP to one country. Test helper.
pub struct FixedGeoResolver(pub Option<String>);

impl GeoResolver for FixedGeoResolver {
    fn country_for(&self, _ip: &str) -> Option<String> {
        self.0.clone()
    }
}

pub type SharedGeoResolver = Arc<dyn GeoResolver>;
