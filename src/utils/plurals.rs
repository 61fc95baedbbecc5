/// `"1 tweet"`, `"3 tweets"`, `"2 replies"` with an explicit plural.
pub fn pluralize(count: usize, singular: &str, plural: Option<&str>) -> String {
    let word = match (count, plural) {
        (1, _) => singular.to_string(),
        (_, Some(p)) => p.to_string(),
        (_, None) => format!("{singular}s"),
    };
    format!("{count} {word}")
}
