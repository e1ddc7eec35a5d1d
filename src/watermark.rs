use crate::parser::Candidate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Candidates newer than the watermark, in input order.
    pub accepted: Vec<Candidate>,
    pub new_watermark: i64,
}

/// Keep candidates with `post_id > watermark` and compute the raised watermark.
///
/// The accepted set and the new watermark depend only on the multiset of candidates,
/// not their order.
pub fn filter_new(candidates: &[Candidate], watermark: i64) -> FilterOutcome {
    let accepted: Vec<Candidate> = candidates
        .iter()
        .filter(|c| c.post_id > watermark)
        .cloned()
        .collect();
    let new_watermark = accepted
        .iter()
        .map(|c| c.post_id)
        .fold(watermark, i64::max);

    FilterOutcome {
        accepted,
        new_watermark,
    }
}
