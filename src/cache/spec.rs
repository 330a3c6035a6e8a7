use std::{fmt, str::FromStr, sync::OnceLock, time::Duration};

use regex::Regex;

use crate::{Error, Result};

/// Declarative configuration of a [`BoundedCache`](super::BoundedCache).
///
/// The string form is a comma-separated list of `name=value` options:
///
/// | Option | Value |
/// |---|---|
/// | `initialCapacity` | number of entries to preallocate |
/// | `maximumSize` | maximum number of entries; `0` disables caching |
/// | `expireAfterWrite` | duration, e.g. `5m` |
/// | `expireAfterAccess` | duration, e.g. `30s` |
///
/// Durations are an integer followed by `d`, `h`, `m` or `s`. An empty spec describes an
/// unbounded cache whose entries never expire.
///
/// ```
/// # use std::time::Duration;
/// # use toggle::CacheSpec;
/// let spec: CacheSpec = "maximumSize=1000,expireAfterWrite=5m".parse().unwrap();
/// assert_eq!(spec.maximum_size(), Some(1000));
/// assert_eq!(spec.expire_after_write(), Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSpec {
    initial_capacity: Option<usize>,
    maximum_size: Option<u64>,
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
}

impl CacheSpec {
    /// An unbounded, non-expiring spec.
    pub fn new() -> CacheSpec {
        CacheSpec::default()
    }

    /// Parse a spec string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCacheSpec`] for unknown or duplicate options, missing values,
    /// malformed numbers, or malformed durations.
    pub fn parse(spec: &str) -> Result<CacheSpec> {
        let invalid = |reason: String| Error::InvalidCacheSpec {
            spec: spec.to_owned(),
            reason,
        };

        let mut result = CacheSpec::default();
        for option in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((name, value)) = option.split_once('=') else {
                return Err(invalid(format!("option {option:?} has no value")));
            };
            let (name, value) = (name.trim(), value.trim());

            let duplicate = match name {
                "initialCapacity" => result
                    .initial_capacity
                    .replace(parse_number(value).ok_or_else(|| {
                        invalid(format!("initialCapacity {value:?} is not a number"))
                    })?)
                    .is_some(),
                "maximumSize" => result
                    .maximum_size
                    .replace(parse_number(value).ok_or_else(|| {
                        invalid(format!("maximumSize {value:?} is not a number"))
                    })?)
                    .is_some(),
                "expireAfterWrite" => result
                    .expire_after_write
                    .replace(parse_duration(value).ok_or_else(|| {
                        invalid(format!("expireAfterWrite {value:?} is not a duration"))
                    })?)
                    .is_some(),
                "expireAfterAccess" => result
                    .expire_after_access
                    .replace(parse_duration(value).ok_or_else(|| {
                        invalid(format!("expireAfterAccess {value:?} is not a duration"))
                    })?)
                    .is_some(),
                _ => return Err(invalid(format!("unsupported option {name:?}"))),
            };

            if duplicate {
                return Err(invalid(format!("{name} was already set")));
            }
        }

        Ok(result)
    }

    /// Preallocate room for `initial_capacity` entries.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> CacheSpec {
        self.initial_capacity = Some(initial_capacity);
        self
    }

    /// Bound the cache to `maximum_size` entries.
    pub fn with_maximum_size(mut self, maximum_size: u64) -> CacheSpec {
        self.maximum_size = Some(maximum_size);
        self
    }

    /// Expire entries `ttl` after they were written.
    pub fn with_expire_after_write(mut self, ttl: Duration) -> CacheSpec {
        self.expire_after_write = Some(ttl);
        self
    }

    /// Expire entries `ttl` after they were last read or written.
    pub fn with_expire_after_access(mut self, ttl: Duration) -> CacheSpec {
        self.expire_after_access = Some(ttl);
        self
    }

    /// Number of entries to preallocate.
    pub fn initial_capacity(&self) -> Option<usize> {
        self.initial_capacity
    }

    /// Maximum number of entries.
    pub fn maximum_size(&self) -> Option<u64> {
        self.maximum_size
    }

    /// Time-to-live since write.
    pub fn expire_after_write(&self) -> Option<Duration> {
        self.expire_after_write
    }

    /// Time-to-live since last access.
    pub fn expire_after_access(&self) -> Option<Duration> {
        self.expire_after_access
    }
}

impl FromStr for CacheSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<CacheSpec> {
        CacheSpec::parse(s)
    }
}

/// Renders the spec string. Durations are truncated to whole seconds.
impl fmt::Display for CacheSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut options = Vec::new();
        if let Some(n) = self.initial_capacity {
            options.push(format!("initialCapacity={n}"));
        }
        if let Some(n) = self.maximum_size {
            options.push(format!("maximumSize={n}"));
        }
        if let Some(ttl) = self.expire_after_write {
            options.push(format!("expireAfterWrite={}", DisplayDuration(ttl)));
        }
        if let Some(ttl) = self.expire_after_access {
            options.push(format!("expireAfterAccess={}", DisplayDuration(ttl)));
        }
        f.write_str(&options.join(","))
    }
}

struct DisplayDuration(Duration);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        match secs {
            0 => write!(f, "0s"),
            s if s % 86_400 == 0 => write!(f, "{}d", s / 86_400),
            s if s % 3_600 == 0 => write!(f, "{}h", s / 3_600),
            s if s % 60 == 0 => write!(f, "{}m", s / 60),
            s => write!(f, "{s}s"),
        }
    }
}

fn parse_number<N: FromStr>(value: &str) -> Option<N> {
    if value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

fn parse_duration(value: &str) -> Option<Duration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^(\d+)([dhms])$").expect("duration pattern is valid"));

    let captures = pattern.captures(value)?;
    let amount: u64 = captures[1].parse().ok()?;
    let unit = match &captures[2] {
        "d" => 86_400,
        "h" => 3_600,
        "m" => 60,
        _ => 1,
    };
    amount.checked_mul(unit).map(Duration::from_secs)
}
