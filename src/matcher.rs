use crate::{MatchedSegment, Segment};

/// Return the segments whose text contains any keyword, in input order.
///
/// Matching is a case-insensitive substring test, so "cat" also hits
/// "category". An empty keyword list matches nothing; a blank keyword
/// matches every segment.
pub fn match_keywords<S: AsRef<str>>(segments: &[Segment], keywords: &[S]) -> Vec<MatchedSegment> {
    if keywords.is_empty() {
        return Vec::new();
    }

    let needles: Vec<String> = keywords.iter().map(|k| k.as_ref().to_lowercase()).collect();

    segments
        .iter()
        .filter(|seg| {
            let haystack = seg.text.to_lowercase();
            needles.iter().any(|n| haystack.contains(n.as_str()))
        })
        .map(MatchedSegment::from)
        .collect()
}
