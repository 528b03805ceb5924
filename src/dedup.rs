use std::collections::HashSet;

use crate::engine::Candidate;

/// Keeps the first occurrence of each distinct candidate text, preserving
/// the engine's ranking.
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let before = candidates.len();
    let kept = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.text.clone()))
        .collect::<Vec<_>>();
    if kept.len() < before {
        log::trace!("Dropped {} repeated candidates", before - kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|it| it.text.as_str()).collect()
    }

    #[test]
    fn repeats_are_dropped_in_rank_order() {
        let kept = dedupe(vec![
            Candidate::new(0, "cat", 0.9),
            Candidate::new(1, "cat", 0.8),
            Candidate::new(2, "dog", 0.7),
        ]);
        assert_eq!(texts(&kept), ["cat", "dog"]);
        assert_eq!(kept[0].rank, 0);
        assert_eq!(kept[1].rank, 2);
    }

    #[test]
    fn equal_confidence_keeps_engine_order() {
        let kept = dedupe(vec![
            Candidate::new(0, "b", 0.5),
            Candidate::new(1, "a", 0.5),
            Candidate::new(2, "b", 0.5),
        ]);
        assert_eq!(texts(&kept), ["b", "a"]);
    }

    #[test]
    fn near_duplicates_survive() {
        let kept = dedupe(vec![
            Candidate::new(0, "Cat", 0.9),
            Candidate::new(1, "cat", 0.8),
            Candidate::new(2, "cat ", 0.7),
        ]);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
