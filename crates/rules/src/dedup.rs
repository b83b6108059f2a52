//! Overlap resolution

use crate::PiiMatch;

/// Reduces candidates to a start-sorted, non-overlapping set.
///
/// Candidates are stable-sorted by start and walked in order. A candidate that
/// overlaps the accepted set replaces the overlapped match only with strictly
/// higher confidence; on a tie the accepted match stays.
pub fn resolve_overlaps(mut candidates: Vec<PiiMatch>) -> Vec<PiiMatch> {
    candidates.sort_by_key(|m| m.start());

    let mut accepted: Vec<PiiMatch> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        // Accepted matches are disjoint and start no later than the candidate,
        // so only the last one can overlap it.
        match accepted.last_mut() {
            Some(last) if last.overlaps(&candidate) => {
                if candidate.confidence() > last.confidence() {
                    log::debug!(
                        "[Detector] {} ({:.2}) replaces {} ({:.2}) at {}..{}",
                        candidate.category(),
                        candidate.confidence(),
                        last.category(),
                        last.confidence(),
                        candidate.start(),
                        candidate.end()
                    );
                    *last = candidate;
                }
            }
            _ => accepted.push(candidate),
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PiiCategory;

    fn m(category: PiiCategory, confidence: f32, start: usize, end: usize) -> PiiMatch {
        PiiMatch::new("x".repeat(end - start), category, confidence, start, end)
    }

    #[test]
    fn test_higher_confidence_replaces() {
        let out = resolve_overlaps(vec![
            m(PiiCategory::Phone, 0.7, 10, 20),
            m(PiiCategory::MedicalId, 0.9, 12, 20),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category(), PiiCategory::MedicalId);
    }

    #[test]
    fn test_tie_keeps_earlier() {
        let out = resolve_overlaps(vec![
            m(PiiCategory::Name, 0.8, 0, 8),
            m(PiiCategory::Address, 0.8, 4, 12),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category(), PiiCategory::Name);
    }

    #[test]
    fn test_same_start_keeps_first_listed_on_tie() {
        let out = resolve_overlaps(vec![
            m(PiiCategory::Ssn, 1.0, 5, 16),
            m(PiiCategory::Phone, 1.0, 5, 16),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category(), PiiCategory::Ssn);
    }

    #[test]
    fn test_output_sorted_and_disjoint() {
        let out = resolve_overlaps(vec![
            m(PiiCategory::Ssn, 0.9, 40, 51),
            m(PiiCategory::Name, 0.5, 0, 8),
            m(PiiCategory::Phone, 0.7, 20, 34),
            m(PiiCategory::Name, 0.9, 2, 6),
            m(PiiCategory::Phone, 0.6, 30, 45),
        ]);
        let spans: Vec<(usize, usize)> = out.iter().map(|m| (m.start(), m.end())).collect();
        assert_eq!(spans, vec![(2, 6), (20, 34), (40, 51)]);
        for pair in out.windows(2) {
            assert!(pair[0].end() <= pair[1].start());
        }
    }

    #[test]
    fn test_adjacent_spans_both_kept() {
        let out = resolve_overlaps(vec![
            m(PiiCategory::Name, 0.5, 0, 4),
            m(PiiCategory::Name, 0.5, 4, 8),
        ]);
        assert_eq!(out.len(), 2);
    }
}
