use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use crate::{RequotaError, Rule, RuleSet};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn rule_reports_every_field_it_was_built_with() {
    let rule = Rule::of(Duration::from_secs(60), 10)
        .unwrap()
        .with_precision(12)
        .unwrap()
        .with_name("per-minute");

    assert_eq!(rule.window_seconds(), 60);
    assert_eq!(rule.limit(), 10);
    assert_eq!(rule.precision(), 12);
    assert_eq!(rule.name(), Some("per-minute"));
    assert_eq!(rule.bucket_width_seconds(), 5);
}

#[test]
fn rule_defaults_to_one_second_buckets_and_no_name() {
    let rule = Rule::of(Duration::from_secs(3600), 100).unwrap();

    assert_eq!(rule.precision(), 3600);
    assert_eq!(rule.bucket_width_seconds(), 1);
    assert_eq!(rule.name(), None);
}

#[test]
fn rule_builders_do_not_mutate_the_original() {
    let base = Rule::of(Duration::from_secs(60), 10).unwrap();
    let named = base.with_name("n");
    let coarse = base.with_precision(1).unwrap();

    assert_eq!(base.name(), None);
    assert_eq!(base.precision(), 60);
    assert_eq!(named.precision(), 60);
    assert_eq!(coarse.name(), None);
    assert_eq!(coarse.bucket_width_seconds(), 60);
}

#[test]
fn rule_rejects_sub_second_window() {
    assert_eq!(
        Rule::of(Duration::from_millis(999), 10).unwrap_err(),
        RequotaError::InvalidRule("window must be at least 1 second".to_string())
    );
    assert!(Rule::of(Duration::ZERO, 10).is_err());
}

#[test]
fn rule_truncates_window_to_whole_seconds() {
    let rule = Rule::of(Duration::from_millis(2500), 1).unwrap();
    assert_eq!(rule.window_seconds(), 2);
}

#[test]
fn rule_rejects_zero_limit() {
    assert_eq!(
        Rule::of(Duration::from_secs(1), 0).unwrap_err(),
        RequotaError::InvalidRule("limit must be greater than 0".to_string())
    );
}

#[test]
fn rule_rejects_precision_outside_window() {
    let rule = Rule::of(Duration::from_secs(10), 5).unwrap();

    assert!(matches!(
        rule.with_precision(0),
        Err(RequotaError::InvalidRule(_))
    ));
    assert!(matches!(
        rule.with_precision(11),
        Err(RequotaError::InvalidRule(_))
    ));
    assert_eq!(rule.with_precision(1).unwrap().precision(), 1);
    assert_eq!(rule.with_precision(10).unwrap().precision(), 10);
}

#[test]
fn uneven_precision_rounds_bucket_width_down() {
    let rule = Rule::of(Duration::from_secs(10), 5)
        .unwrap()
        .with_precision(3)
        .unwrap();

    assert_eq!(rule.bucket_width_seconds(), 3);
    assert_eq!(rule.bucket_start(1_000_001), 999_999);
}

#[test]
fn rule_equality_covers_every_field() {
    let a = Rule::of(Duration::from_secs(60), 10).unwrap();
    let b = Rule::of(Duration::from_secs(60), 10).unwrap();

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));

    assert_ne!(a, Rule::of(Duration::from_secs(61), 10).unwrap());
    assert_ne!(a, Rule::of(Duration::from_secs(60), 11).unwrap());
    assert_ne!(a, a.with_precision(6).unwrap());
    assert_ne!(a, a.with_name("x"));
    assert_eq!(a.with_name("x"), b.with_name("x"));
}

#[test]
fn rule_set_rejects_empty() {
    assert!(matches!(
        RuleSet::new(Vec::new()),
        Err(RequotaError::InvalidRuleSet(_))
    ));
}

#[test]
fn rule_set_equality_ignores_order_and_duplicates() {
    let minute = Rule::of(Duration::from_secs(60), 10).unwrap();
    let hour = Rule::of(Duration::from_secs(3600), 100).unwrap();

    let a = RuleSet::new([minute.clone(), hour.clone()]).unwrap();
    let b = RuleSet::new([hour.clone(), minute.clone(), hour.clone()]).unwrap();

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(b.rules().len(), 2);

    // Declaration order is kept for reporting.
    assert_eq!(a.rules()[0], minute);
    assert_eq!(b.rules()[0], hour);
}

#[test]
fn rule_set_from_single_rule_equals_built_set() {
    let rule = Rule::of(Duration::from_secs(60), 10).unwrap();

    assert_eq!(
        RuleSet::from(rule.clone()),
        RuleSet::try_from(vec![rule]).unwrap()
    );
}

#[test]
fn rule_sets_with_different_limits_differ() {
    let a = RuleSet::from(Rule::of(Duration::from_secs(60), 22).unwrap());
    let b = RuleSet::from(Rule::of(Duration::from_secs(60), 33).unwrap());

    assert_ne!(a, b);
}
