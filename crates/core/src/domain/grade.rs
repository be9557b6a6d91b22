use crate::domain::record::RecommendationCounts;

/// Only the most recent entries of a grade history are tallied.
pub const RECENT_GRADE_WINDOW: usize = 10;

const BUY_LIKE: [&str; 2] = ["buy", "outperform"];
const HOLD_LIKE: [&str; 2] = ["hold", "neutral"];
const SELL_LIKE: [&str; 2] = ["sell", "underperform"];

/// One analyst action, e.g. "Hold" -> "Buy".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeEntry {
    pub to_grade: String,
    pub from_grade: Option<String>,
}

impl GradeEntry {
    pub fn new(to_grade: impl Into<String>, from_grade: Option<&str>) -> Self {
        Self {
            to_grade: to_grade.into(),
            from_grade: from_grade.map(str::to_string),
        }
    }
}

/// Tallies the last [`RECENT_GRADE_WINDOW`] entries of a chronologically ordered (oldest first)
/// history.
///
/// Buy/hold/sell buckets are matched independently by case-insensitive substring, so one entry
/// can land in more than one bucket. Upgrades and downgrades compare [`grade_rank`] of the to-
/// and from-grade; an entry with an unranked grade on either side counts as neither.
pub fn tally_recent(history: &[GradeEntry]) -> RecommendationCounts {
    let start = history.len().saturating_sub(RECENT_GRADE_WINDOW);
    let mut out = RecommendationCounts::default();

    for entry in &history[start..] {
        let to = entry.to_grade.to_lowercase();
        if matches_any(&to, &BUY_LIKE) {
            out.buy += 1;
        }
        if matches_any(&to, &HOLD_LIKE) {
            out.hold += 1;
        }
        if matches_any(&to, &SELL_LIKE) {
            out.sell += 1;
        }

        let ranks = (
            grade_rank(&entry.to_grade),
            entry.from_grade.as_deref().and_then(grade_rank),
        );
        if let (Some(to_rank), Some(from_rank)) = ranks {
            if to_rank > from_rank {
                out.upgrades += 1;
            } else if to_rank < from_rank {
                out.downgrades += 1;
            }
        }
    }

    out
}

fn matches_any(grade_lower: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|v| grade_lower.contains(v))
}

/// Sentiment rank of a known grade label, from 0 (strong sell) to 4 (strong buy).
pub fn grade_rank(grade: &str) -> Option<u8> {
    let g = grade.trim().to_lowercase().replace(['_', '-'], " ");
    let rank = match g.as_str() {
        "strong sell" => 0,
        "sell" | "underperform" | "underweight" | "reduce" | "market underperform"
        | "sector underperform" | "negative" => 1,
        "hold" | "neutral" | "equal weight" | "market perform" | "sector perform"
        | "peer perform" | "in line" | "perform" | "sector weight" | "mixed" => 2,
        "buy" | "outperform" | "overweight" | "accumulate" | "market outperform"
        | "sector outperform" | "positive" | "add" | "moderate buy" | "speculative buy" => 3,
        "strong buy" | "conviction buy" | "top pick" => 4,
        _ => return None,
    };
    Some(rank)
}
