/// MQTT topic filter matching: `+` matches exactly one level, a trailing `#`
/// matches the parent level and everything below it.
pub fn matches(filter: &str, topic: &str) -> bool {
    // `$SYS` style topics are never matched by leading wildcards
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
