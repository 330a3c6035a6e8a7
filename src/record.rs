//! Toggle record model shared by every backing source.
//!
//! A record looks like this in a YAML toggle document:
//!
//! ```yaml
//! - key: /feature/admin_widget
//!   value: 0
//!   filters:
//!     - type: cohort
//!       target: admin
//!       value: 10000
//! ```
//!
//! Weights must be written as integers. A float such as `5000.0` or `1e4` is rejected even when
//! it has no fractional part, which makes the whole record invalid.
use derive_more::Into;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Deserializer, Serialize};

/// Toggle-on probability scaled by 10,000: `0` is never on, `10000` is always on.
///
/// Deserializes from an integer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Into)]
#[serde(try_from = "i64", into = "u16")]
pub struct Weight(u16);

impl Weight {
    /// Upper bound of the weight scale.
    pub const SCALE: u16 = 10_000;
    /// A weight that never turns the toggle on.
    pub const NEVER: Weight = Weight(0);
    /// A weight that always turns the toggle on.
    pub const ALWAYS: Weight = Weight(Weight::SCALE);

    /// Returns `None` if `value` exceeds [`Weight::SCALE`].
    pub const fn new(value: u16) -> Option<Weight> {
        if value <= Weight::SCALE {
            Some(Weight(value))
        } else {
            None
        }
    }

    /// Raw weight in `[0, 10000]`.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Draw a weighted pseudorandom boolean: `true` with probability `w/10000`.
    ///
    /// Uses the thread-local generator, so concurrent callers never contend.
    pub fn draw(self) -> bool {
        self.0 > 0 && thread_rng().gen_range(0..Weight::SCALE) < self.0
    }
}

/// Weight value outside of `[0, 10000]`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("toggle weight {0} is outside of [0, 10000]")]
pub struct WeightOutOfRange(pub i64);

impl TryFrom<i64> for Weight {
    type Error = WeightOutOfRange;

    fn try_from(value: i64) -> Result<Weight, WeightOutOfRange> {
        u16::try_from(value)
            .ok()
            .and_then(Weight::new)
            .ok_or(WeightOutOfRange(value))
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed value.
    Parsed(T),
    /// Raw value that failed to parse.
    ParseFailed(serde_json::Value),
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// A targeting rule overriding the record's default weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filter {
    /// Applies when the evaluation cohort equals `target`.
    Cohort {
        /// Cohort this filter applies to.
        target: String,
        /// Weight used instead of the record's default.
        #[serde(alias = "toggle_value")]
        value: Weight,
    },
}

impl Filter {
    /// Create a cohort filter.
    pub fn cohort(target: impl Into<String>, value: Weight) -> Filter {
        Filter::Cohort {
            target: target.into(),
            value,
        }
    }

    /// Returns `true` if the filter targets `cohort`. Never matches when no cohort is given.
    pub fn matches_cohort(&self, cohort: Option<&str>) -> bool {
        match (self, cohort) {
            (Filter::Cohort { target, .. }, Some(cohort)) => target == cohort,
            (Filter::Cohort { .. }, None) => false,
        }
    }

    /// Weight applied when the filter matches.
    pub fn weight(&self) -> Weight {
        match self {
            Filter::Cohort { value, .. } => *value,
        }
    }
}

/// Definition of a single toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleRecord {
    /// Canonical toggle key, e.g. `/feature/admin_widget`.
    #[serde(alias = "toggle_key")]
    pub key: String,
    /// Default weight, used when no filter matches.
    #[serde(alias = "toggle_value")]
    pub value: Weight,
    /// Cohort filters in declaration order. Filters of unknown types are kept unparsed and never
    /// match.
    #[serde(
        default,
        alias = "filter",
        deserialize_with = "deserialize_filters",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub filters: Vec<TryParse<Filter>>,
}

impl ToggleRecord {
    /// Create a record without filters.
    pub fn new(key: impl Into<String>, value: Weight) -> ToggleRecord {
        ToggleRecord {
            key: key.into(),
            value,
            filters: Vec::new(),
        }
    }

    /// Append a filter.
    pub fn with_filter(mut self, filter: Filter) -> ToggleRecord {
        self.filters.push(TryParse::Parsed(filter));
        self
    }

    /// First filter in declaration order that matches `cohort`.
    pub fn find_filter(&self, cohort: Option<&str>) -> Option<&Filter> {
        self.filters
            .iter()
            .filter_map(|filter| Option::<&Filter>::from(filter))
            .find(|filter| filter.matches_cohort(cohort))
    }

    /// Weight that applies to `cohort`.
    pub fn weight_for(&self, cohort: Option<&str>) -> Weight {
        self.find_filter(cohort)
            .map_or(self.value, |filter| filter.weight())
    }

    /// Draw a toggle state for `cohort`.
    pub fn evaluate(&self, cohort: Option<&str>) -> bool {
        self.weight_for(cohort).draw()
    }
}

/// Accepts a missing/`null` field, a single filter object, or an array of filters.
fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<TryParse<Filter>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<TryParse<Filter>>),
        One(TryParse<Filter>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(filters)) => filters,
        Some(OneOrMany::One(filter)) => vec![filter],
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::{Filter, ToggleRecord, TryParse, Weight};

    fn parse(value: serde_json::Value) -> ToggleRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn zero_weight_never_draws_true() {
        assert!((0..10_000).all(|_| !Weight::NEVER.draw()));
    }

    #[test]
    fn full_weight_always_draws_true() {
        assert!((0..10_000).all(|_| Weight::ALWAYS.draw()));
    }

    #[test]
    fn partial_weight_approximates_probability() {
        let trials = 100_000;
        for raw in [100, 2_500, 3_000, 5_000, 9_000] {
            let weight = Weight::new(raw).unwrap();
            let hits = (0..trials).filter(|_| weight.draw()).count();
            let observed = hits as f64 / trials as f64;
            let expected = raw as f64 / Weight::SCALE as f64;
            // ~7 standard deviations at p = 0.5
            assert!(
                (observed - expected).abs() < 0.011,
                "weight {raw}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn rejects_weights_out_of_range() {
        assert_eq!(Weight::new(10_001), None);
        assert!(serde_json::from_value::<Weight>(json!(-1)).is_err());
        assert!(serde_json::from_value::<Weight>(json!(10_001)).is_err());
        assert!(serde_json::from_value::<Weight>(json!("5000")).is_err());
        assert_eq!(
            serde_json::from_value::<Weight>(json!(10_000)).unwrap(),
            Weight::ALWAYS
        );
    }

    #[test]
    fn float_weights_invalidate_record() {
        assert!(serde_json::from_value::<Weight>(json!(5000.0)).is_err());
        assert!(
            serde_json::from_value::<ToggleRecord>(json!({"key": "a", "value": 5000.0})).is_err()
        );

        let nodes = crate::document::node::parse_document("- key: a\n  value: 5000.0\n").unwrap();
        assert!(ToggleRecord::deserialize(&nodes[0]).is_err());
    }

    #[test]
    fn parses_record_with_filter_list() {
        let record = parse(json!({
            "key": "/feature/admin_widget",
            "value": 0,
            "filters": [{"type": "cohort", "target": "admin", "value": 10000}]
        }));
        assert_eq!(
            record,
            ToggleRecord::new("/feature/admin_widget", Weight::NEVER)
                .with_filter(Filter::cohort("admin", Weight::ALWAYS))
        );
    }

    #[test]
    fn parses_single_filter_object_under_filter_alias() {
        let record = parse(json!({
            "key": "/feature/dogfood_widget",
            "value": 0,
            "filter": {"type": "cohort", "target": "employee", "value": 10000}
        }));
        assert_eq!(record.weight_for(Some("employee")), Weight::ALWAYS);
    }

    #[test]
    fn parses_remote_table_attribute_names() {
        let record = parse(json!({
            "toggle_key": "/feature/ab_test",
            "toggle_value": 5000,
            "filter": [{"type": "cohort", "target": "beta", "toggle_value": 10000}]
        }));
        assert_eq!(record.key, "/feature/ab_test");
        assert_eq!(record.value.get(), 5000);
        assert_eq!(record.weight_for(Some("beta")), Weight::ALWAYS);
    }

    #[test]
    fn null_or_missing_filters_are_empty() {
        assert!(parse(json!({"key": "a", "value": 1})).filters.is_empty());
        assert!(parse(json!({"key": "a", "value": 1, "filters": null}))
            .filters
            .is_empty());
    }

    #[test]
    fn unknown_filters_are_kept_but_never_match() {
        let record = parse(json!({
            "key": "/feature/x",
            "value": 0,
            "filters": [
                {"type": "region", "target": "eu", "value": 10000},
                {"type": 4, "bar": true},
                {"type": "cohort", "target": "eu", "value": 10000}
            ]
        }));
        assert!(matches!(record.filters[0], TryParse::ParseFailed(_)));
        assert!(matches!(record.filters[1], TryParse::ParseFailed(_)));
        assert_eq!(record.find_filter(Some("eu")), Some(&Filter::cohort("eu", Weight::ALWAYS)));
    }

    #[test]
    fn first_matching_filter_wins() {
        let record = ToggleRecord::new("/feature/x", Weight::NEVER)
            .with_filter(Filter::cohort("admin", Weight::ALWAYS))
            .with_filter(Filter::cohort("admin", Weight::NEVER));
        assert_eq!(record.weight_for(Some("admin")), Weight::ALWAYS);
    }

    #[test]
    fn no_cohort_never_matches_a_filter() {
        let record = ToggleRecord::new("/feature/x", Weight::NEVER)
            .with_filter(Filter::cohort("", Weight::ALWAYS));
        assert_eq!(record.find_filter(None), None);
        assert!(!record.evaluate(None));
        assert!(record.evaluate(Some("")));
    }

    #[test]
    fn invalid_weight_invalidates_record() {
        assert!(serde_json::from_value::<ToggleRecord>(json!({"key": "a", "value": 20000})).is_err());
        assert!(serde_json::from_value::<ToggleRecord>(json!({"key": "a"})).is_err());
    }
}
