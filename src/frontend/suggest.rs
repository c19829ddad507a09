use strsim::levenshtein;

/// Return a "did you mean …?" note for an unknown name, or None when no
/// candidate is close enough to be worth suggesting.
pub fn did_you_mean(needle: &str, candidates: impl IntoIterator<Item = String>) -> Option<String> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    let max_dist = match needle.len() {
        0..=3 => 1,
        4..=6 => 2,
        7..=10 => 3,
        _ => 4,
    };

    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .filter(|c| !c.is_empty() && c != needle)
        .map(|c| (levenshtein(needle, &c), c))
        .filter(|(d, _)| *d <= max_dist)
        .collect();
    scored.sort_by(|(da, a), (db, b)| da.cmp(db).then(a.len().cmp(&b.len())).then(a.cmp(b)));
    scored.truncate(3);

    match scored.len() {
        0 => None,
        1 => Some(format!("did you mean `{}`?", scored[0].1)),
        _ => Some(format!(
            "did you mean one of: {}?",
            scored
                .iter()
                .map(|(_, s)| format!("`{}`", s))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}
