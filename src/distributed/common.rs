use crate::{RequotaError, Rule};

/// Base key shared by every bucket of one `(key, rule)` pair.
///
/// Layout: `<prefix>:{<key>}:<window_seconds>:<precision>`. The caller key is
/// wrapped in a hash tag so every bucket of a key lands on the same cluster
/// slot. Buckets append `:<bucket_start>`.
pub(crate) fn window_base_key(prefix: &str, key: &str, rule: &Rule) -> String {
    format!(
        "{prefix}:{{{key}}}:{}:{}",
        rule.window_seconds(),
        rule.precision()
    )
}

pub(crate) fn bucket_key(base_key: &str, bucket_start: u64) -> String {
    format!("{base_key}:{bucket_start}")
}

/// Bucket starts that count toward the window ending at `now_seconds`, newest first.
pub(crate) fn counted_bucket_starts(rule: &Rule, now_seconds: u64) -> impl Iterator<Item = u64> {
    let width = rule.bucket_width_seconds();
    let window = rule.window_seconds();
    let current = rule.bucket_start(now_seconds);

    std::iter::successors(Some(current), move |start| start.checked_sub(width))
        .take_while(move |start| start + window > now_seconds)
}

pub(crate) fn validate_store_key(key: &str) -> Result<(), RequotaError> {
    if key.is_empty() {
        return Err(RequotaError::InvalidKey("key must not be empty".to_string()));
    }

    if key.contains(['{', '}']) {
        return Err(RequotaError::InvalidKey(
            "key must not contain '{' or '}'".to_string(),
        ));
    }

    Ok(())
}
