use crate::task::Task;

/// Scores are on a 0..1 scale where 0 is an exact match. Candidates above
/// this tolerance are dropped from search results.
pub const SCORE_THRESHOLD: f64 = 0.3;

/// Relevance of `query` against a task's title, description and tags.
/// Returns `None` when the task falls outside the tolerance.
pub fn score_task(query: &str, task: &Task) -> Option<f64> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Some(0.0);
    }

    let mut best = f64::MAX;
    for field in [task.text.as_str(), task.description.as_str()]
        .into_iter()
        .chain(task.tags.iter().map(String::as_str))
    {
        if let Some(score) = score_field(&query, field) {
            best = best.min(score);
        }
    }

    (best <= SCORE_THRESHOLD).then_some(best)
}

fn score_field(query: &str, field: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    let field = field.to_lowercase();

    // Candidates are the individual tokens plus the field as a whole, so a
    // multi-word query can still land on a phrase.
    let mut best = score_candidate(query, &field);
    for token in field.split_whitespace() {
        best = best.min(score_candidate(query, token));
    }
    Some(best)
}

fn score_candidate(query: &str, candidate: &str) -> f64 {
    if candidate == query {
        return 0.0;
    }

    let query_len = query.chars().count();
    let candidate_len = candidate.chars().count();
    if candidate_len == 0 || query_len == 0 {
        return 1.0;
    }

    // Containment is a strong signal; the remainder only pays half the
    // usual length penalty.
    if candidate.contains(query) {
        return (candidate_len - query_len) as f64 / candidate_len as f64 * 0.5;
    }

    let distance = levenshtein(query, candidate);
    distance as f64 / query_len.max(candidate_len) as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ch_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, ch_b) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ch_a != ch_b);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{SCORE_THRESHOLD, levenshtein, score_task};
    use crate::task::{Task, TaskDraft};

    fn task(text: &str, description: &str, tags: &[&str]) -> Task {
        let mut draft = TaskDraft::new(text);
        draft.description = description.to_string();
        let mut task = Task::from_draft(draft, Utc::now());
        task.tags = tags.iter().map(ToString::to_string).collect();
        task
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(levenshtein("water", "water"), 0);
        assert_eq!(levenshtein("water", "watr"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn exact_title_match_scores_zero() {
        let score = score_task("groceries", &task("groceries", "", &[])).expect("match");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn small_typo_stays_within_tolerance() {
        let score = score_task("grocries", &task("buy groceries", "", &[])).expect("match");
        assert!(score > 0.0);
        assert!(score <= SCORE_THRESHOLD);
    }

    #[test]
    fn unrelated_text_is_dropped() {
        assert!(score_task("dentist", &task("water the plants", "", &[])).is_none());
    }

    #[test]
    fn description_and_tags_are_searched() {
        assert!(score_task("landlord", &task("email", "ask the landlord", &[])).is_some());
        assert!(score_task("urgent", &task("email", "", &["urgent"])).is_some());
    }

    #[test]
    fn closer_matches_score_lower() {
        let exact = score_task("rent", &task("rent", "", &[])).expect("exact");
        let partial = score_task("rent", &task("rental car", "", &[])).expect("partial");
        assert!(exact < partial);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(score_task("RENT", &task("pay rent", "", &[])).is_some());
    }
}
