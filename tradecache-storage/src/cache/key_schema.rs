//! Cache key derivation and per-resource expiry.
//!
//! Keys have the form `<namespace>:<resource_type>:<name>=<value>:...` with
//! parameter names in lexicographic order, so the same request always maps
//! to the same key regardless of how its parameters were assembled. The
//! format is persisted in the store and must stay stable.

use std::collections::BTreeMap;

use tradecache_core::{CacheSettings, ResourceType, SchemaError, Ttl};

/// Characters that would break key parsing or act as glob metacharacters.
const UNSAFE_KEY_CHARS: &[char] = &[':', '|', '=', '*', '?', '[', ']'];

const DEFAULT_NAMESPACE: &str = "cache";

/// Replace delimiter, glob and whitespace characters with `_`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_whitespace() || UNSAFE_KEY_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Named request parameters. A `None` value marks an absent optional parameter.
///
/// Names are sanitized on insert, so ordering and uniqueness hold for the
/// names that end up in the key. Names that sanitize alike collapse to one
/// entry, last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParams {
    params: BTreeMap<String, Option<String>>,
}

impl KeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a present parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params
            .insert(sanitize(&name.into()), Some(value.to_string()));
        self
    }

    /// Add an optional parameter; `None` is omitted from the key.
    pub fn with_optional<V: ToString>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.params
            .insert(sanitize(&name.into()), value.map(|v| v.to_string()));
        self
    }

    /// Value of a present parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .get(&sanitize(name))
            .and_then(|v| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn present(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (name.as_str(), v)))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(name, value)| (sanitize(&name.into()), Some(value.into())))
                .collect(),
        }
    }
}

/// Derives keys and expiries for every [`ResourceType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    namespace: String,
}

impl Default for KeySchema {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeySchema {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.namespace.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Derive the key for a request.
    ///
    /// Fails with [`SchemaError::MissingParameter`] when a required parameter
    /// is absent or `None`.
    pub fn get_key(
        &self,
        resource_type: ResourceType,
        params: &KeyParams,
    ) -> Result<String, SchemaError> {
        if let Some(missing) = resource_type
            .required_params()
            .iter()
            .find(|name| params.get(name).is_none())
        {
            return Err(SchemaError::MissingParameter {
                resource_type,
                field: missing.to_string(),
            });
        }

        let mut key = format!("{}:{}", self.namespace, resource_type.as_str());
        for (name, value) in params.present() {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(&sanitize(value));
        }
        Ok(key)
    }

    /// Derive a key from a resource's wire name.
    pub fn get_key_by_name(&self, name: &str, params: &KeyParams) -> Result<String, SchemaError> {
        self.get_key(name.parse()?, params)
    }

    pub fn get_ttl(&self, resource_type: ResourceType) -> Ttl {
        resource_type.ttl()
    }

    /// Expiry in seconds, or `-1` for persistent resources.
    pub fn ttl_seconds(&self, resource_type: ResourceType) -> i64 {
        self.get_ttl(resource_type).as_seconds()
    }

    /// Glob matching every key of one resource type.
    pub fn pattern_for(&self, resource_type: ResourceType) -> String {
        format!("{}:{}:*", self.namespace, resource_type.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_key_sorted_by_name() {
        let schema = KeySchema::default();
        let params = KeyParams::new()
            .with("timeframe", "1Day")
            .with("symbol", "AAPL");
        assert_eq!(
            schema.get_key(ResourceType::StockBars, &params).unwrap(),
            "cache:stock_bars:symbol=AAPL:timeframe=1Day"
        );
    }

    #[test]
    fn test_missing_required_parameter() {
        let schema = KeySchema::default();
        let params = KeyParams::new().with("symbol", "AAPL");
        assert_eq!(
            schema.get_key(ResourceType::StockBars, &params),
            Err(SchemaError::MissingParameter {
                resource_type: ResourceType::StockBars,
                field: "timeframe".to_string(),
            })
        );
    }

    #[test]
    fn test_null_required_parameter_is_missing() {
        let schema = KeySchema::default();
        let params = KeyParams::new().with_optional::<String>("user_id", None);
        assert!(matches!(
            schema.get_key(ResourceType::Positions, &params),
            Err(SchemaError::MissingParameter { field, .. }) if field == "user_id"
        ));
    }

    #[test]
    fn test_null_optional_parameter_omitted() {
        let schema = KeySchema::default();
        let params = KeyParams::new()
            .with("symbol", "AAPL")
            .with("timeframe", "1Min")
            .with_optional::<&str>("start", None)
            .with_optional("limit", Some(100));
        assert_eq!(
            schema.get_key(ResourceType::StockBars, &params).unwrap(),
            "cache:stock_bars:limit=100:symbol=AAPL:timeframe=1Min"
        );
    }

    #[test]
    fn test_unsafe_characters_replaced() {
        let schema = KeySchema::default();
        let params = KeyParams::new().with("symbol", "MSFT:|!");
        assert_eq!(
            schema.get_key(ResourceType::StockQuote, &params).unwrap(),
            "cache:stock_quote:symbol=MSFT__!"
        );
        assert_eq!(sanitize("a b*c?[d]=e"), "a_b_c__d__e");
    }

    #[test]
    fn test_get_key_by_name() {
        let schema = KeySchema::default();
        let params = KeyParams::new().with("user_id", "u1");
        assert_eq!(
            schema.get_key_by_name("account_summary", &params).unwrap(),
            "cache:account_summary:user_id=u1"
        );
        assert_eq!(
            schema.get_key_by_name("not_a_key_type", &params),
            Err(SchemaError::UnknownResourceType {
                name: "not_a_key_type".to_string()
            })
        );
    }

    #[test]
    fn test_ttl_and_pattern() {
        let schema = KeySchema::new("tc");
        assert_eq!(schema.get_ttl(ResourceType::StockQuote), Ttl::Seconds(60));
        assert_eq!(schema.ttl_seconds(ResourceType::Positions), 300);
        assert_eq!(schema.pattern_for(ResourceType::Positions), "tc:positions:*");
    }

    #[test]
    fn test_from_iterator() {
        let params: KeyParams = [("symbol", "AAPL"), ("timeframe", "1Day")]
            .into_iter()
            .collect();
        assert_eq!(params.get("symbol"), Some("AAPL"));
        assert_eq!(params.get("start"), None);
    }

    #[test]
    fn test_names_that_sanitize_alike_collapse() {
        let schema = KeySchema::default();
        let params = KeyParams::new()
            .with("symbol", "AAPL")
            .with("a b", "1")
            .with("a_b", "2");
        assert_eq!(
            schema.get_key(ResourceType::StockQuote, &params).unwrap(),
            "cache:stock_quote:a_b=2:symbol=AAPL"
        );
        assert_eq!(params.get("a b"), Some("2"));
    }

    #[test]
    fn test_segments_sorted_by_sanitized_name() {
        // Raw "a=z" sorts before "a_b"; sanitized "a_z" sorts after
        let schema = KeySchema::default();
        let params = KeyParams::new()
            .with("symbol", "AAPL")
            .with("a=z", "1")
            .with("a_b", "2");
        assert_eq!(
            schema.get_key(ResourceType::StockQuote, &params).unwrap(),
            "cache:stock_quote:a_b=2:a_z=1:symbol=AAPL"
        );
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;
        use tradecache_test_utils::generators::{arb_key_params, arb_resource_type};

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(128))]

            #[test]
            fn prop_key_invariant_under_insertion_order(pairs in arb_key_params()) {
                let schema = KeySchema::default();
                let forward: KeyParams = pairs.iter().cloned().collect();
                let reverse: KeyParams = pairs.iter().rev().cloned().collect();
                prop_assert_eq!(
                    schema.get_key(ResourceType::StockBars, &forward),
                    schema.get_key(ResourceType::StockBars, &reverse)
                );
            }

            #[test]
            fn prop_segment_names_unique_and_sorted(
                names in prop::collection::vec("[a-c =:*]{1,3}", 0..6),
            ) {
                let params = names
                    .iter()
                    .fold(KeyParams::new().with("symbol", "X"), |p, n| p.with(n.as_str(), "v"));
                let key = KeySchema::default().get_key(ResourceType::StockQuote, &params).unwrap();
                let segment_names: Vec<&str> = key
                    .split(':')
                    .skip(2)
                    .map(|segment| segment.split_once('=').map(|(n, _)| n).unwrap_or(segment))
                    .collect();
                for pair in segment_names.windows(2) {
                    prop_assert!(pair[0] < pair[1], "{:?}", segment_names);
                }
            }

            #[test]
            fn prop_values_never_leak_unsafe_chars(value in ".{0,32}", resource in arb_resource_type()) {
                let schema = KeySchema::default();
                let params: KeyParams = resource
                    .required_params()
                    .iter()
                    .map(|name| (*name, value.as_str()))
                    .collect();
                let key = schema.get_key(resource, &params).unwrap();
                let prefix = format!("cache:{}:", resource.as_str());
                let tail = key.strip_prefix(&prefix).unwrap();
                for segment in tail.split(':') {
                    let (_, v) = segment.split_once('=').unwrap();
                    prop_assert!(!v.chars().any(|c| c.is_whitespace() || UNSAFE_KEY_CHARS.contains(&c)));
                }
            }
        }
    }
}
