//! Limit rules and the rule sets limiters are built from.

use std::{
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use crate::RequotaError;

/// An immutable description of one limit: at most `limit` operations per
/// `window_seconds`, counted in `precision` buckets.
///
/// Rules are value types. Two rules are equal when every field matches, which
/// is what lets a [`RuleSet`] act as a cache key for limiter instances.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use requota::Rule;
///
/// let rule = Rule::of(Duration::from_secs(60), 10)
///     .unwrap()
///     .with_precision(6)
///     .unwrap()
///     .with_name("per-minute");
///
/// assert_eq!(rule.window_seconds(), 60);
/// assert_eq!(rule.limit(), 10);
/// assert_eq!(rule.precision(), 6);
/// assert_eq!(rule.name(), Some("per-minute"));
/// assert_eq!(rule.bucket_width_seconds(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rule {
    window_seconds: u64,
    limit: u64,
    precision: u64,
    name: Option<Arc<str>>,
}

impl Rule {
    /// Create a rule allowing `limit` operations per `window`.
    ///
    /// The window is truncated to whole seconds and must be at least one
    /// second long. Precision defaults to one bucket per second of window.
    pub fn of(window: Duration, limit: u64) -> Result<Self, RequotaError> {
        let window_seconds = window.as_secs();

        if window_seconds == 0 {
            return Err(RequotaError::InvalidRule(
                "window must be at least 1 second".to_string(),
            ));
        }

        if limit == 0 {
            return Err(RequotaError::InvalidRule(
                "limit must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            window_seconds,
            limit,
            precision: window_seconds,
            name: None,
        })
    }

    /// Return a copy of this rule split into `precision` buckets.
    ///
    /// `1` counts the whole window in a single bucket; `window_seconds` gives
    /// one-second buckets.
    pub fn with_precision(&self, precision: u64) -> Result<Self, RequotaError> {
        if precision == 0 || precision > self.window_seconds {
            return Err(RequotaError::InvalidRule(format!(
                "precision must be between 1 and {}, got {precision}",
                self.window_seconds
            )));
        }

        Ok(Self {
            precision,
            ..self.clone()
        })
    }

    /// Return a copy of this rule carrying a descriptive name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: Some(Arc::from(name.into())),
            ..self.clone()
        }
    }

    /// Window length in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Maximum number of operations within the window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of buckets the window is split into.
    pub fn precision(&self) -> u64 {
        self.precision
    }

    /// Optional descriptive name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Width of one bucket in seconds (never less than one).
    pub fn bucket_width_seconds(&self) -> u64 {
        (self.window_seconds / self.precision).max(1)
    }

    /// Start of the bucket that `now_seconds` falls into.
    pub(crate) fn bucket_start(&self, now_seconds: u64) -> u64 {
        let width = self.bucket_width_seconds();
        now_seconds / width * width
    }

    /// Whether a bucket starting at `bucket_start` still counts toward the
    /// window ending at `now_seconds`.
    pub(crate) fn counts_toward_window(&self, bucket_start: u64, now_seconds: u64) -> bool {
        bucket_start + self.window_seconds > now_seconds
    }

    /// Time-to-live given to a bucket each time it is written.
    pub(crate) fn bucket_expiry_seconds(&self) -> u64 {
        self.window_seconds + self.bucket_width_seconds()
    }
}

/// A set of distinct [`Rule`]s evaluated together for one key.
///
/// A request is over limit when any member rule is exceeded. Equality and
/// hashing ignore declaration order, so two sets holding the same rules map to
/// the same cached limiter; declaration order is kept for reporting which rule
/// was breached first.
#[derive(Debug, Clone)]
pub struct RuleSet {
    declared: Arc<[Rule]>,
    canonical: Arc<[Rule]>,
}

impl RuleSet {
    /// Build a rule set, dropping duplicate rules.
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Result<Self, RequotaError> {
        let mut declared: Vec<Rule> = Vec::new();

        for rule in rules {
            if !declared.contains(&rule) {
                declared.push(rule);
            }
        }

        if declared.is_empty() {
            return Err(RequotaError::InvalidRuleSet(
                "rule set must contain at least one rule".to_string(),
            ));
        }

        let mut canonical = declared.clone();
        canonical.sort();

        Ok(Self {
            declared: Arc::from(declared),
            canonical: Arc::from(canonical),
        })
    }

    /// Rules in the order they were declared.
    pub fn rules(&self) -> &[Rule] {
        &self.declared
    }

    /// Iterate over the rules in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.declared.iter()
    }
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for RuleSet {}

impl Hash for RuleSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl From<Rule> for RuleSet {
    fn from(rule: Rule) -> Self {
        let rules: Arc<[Rule]> = Arc::from(vec![rule]);

        Self {
            declared: rules.clone(),
            canonical: rules,
        }
    }
}

impl TryFrom<Vec<Rule>> for RuleSet {
    type Error = RequotaError;

    fn try_from(value: Vec<Rule>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
