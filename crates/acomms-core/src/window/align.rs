//! Cross-queue merging and plot helpers over window views.

use crate::domain::ParsedRecord;

use super::BufferedRecord;

/// Merge buffered records from several queues into one timeline.
///
/// Ordered by timestamp; records with equal timestamps keep arrival order.
pub fn merge<'a, I>(records: I) -> Vec<&'a BufferedRecord>
where
    I: IntoIterator<Item = &'a BufferedRecord>,
{
    let mut merged: Vec<&BufferedRecord> = records.into_iter().collect();
    merged.sort_by_key(|r| (r.record.timestamp, r.seq));
    merged
}

/// A position fix paired with the latest data record at or before it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFix<'a> {
    pub fix: &'a ParsedRecord,
    pub data: Option<&'a ParsedRecord>,
}

/// Backward as-of join of a fix timeline with a data timeline.
///
/// Both inputs must be sorted by timestamp, as window views are.
pub fn align_asof<'a>(fixes: &[&'a ParsedRecord], data: &[&'a ParsedRecord]) -> Vec<AlignedFix<'a>> {
    let mut aligned = Vec::with_capacity(fixes.len());
    let mut next = 0;
    for &fix in fixes {
        while next < data.len() && data[next].timestamp <= fix.timestamp {
            next += 1;
        }
        aligned.push(AlignedFix {
            fix,
            data: next.checked_sub(1).map(|i| data[i]),
        });
    }
    aligned
}

/// Numeric range of one field across a view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

const EXTENT_PAD: f64 = 0.05;

/// Min/max of `field` over `records`, widened by 5% of the spread on each side.
///
/// Records without the field, or with a text value, are ignored.
pub fn field_extent(records: &[&ParsedRecord], field: &str) -> Option<Extent> {
    let mut values = records
        .iter()
        .filter_map(|r| r.field(field).and_then(|v| v.as_f64()));
    let first = values.next()?;
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = (max - min) * EXTENT_PAD;
    Some(Extent {
        min: min - pad,
        max: max + pad,
    })
}

/// True when the two newest records share a timestamp, which usually means
/// the source stopped stamping new data.
pub fn repeated_timestamp(records: &[&ParsedRecord]) -> bool {
    match records {
        [.., a, b] => a.timestamp == b.timestamp,
        _ => false,
    }
}
