use std::collections::BTreeSet;

use crate::models::{AggregateTable, Mode, RetentionMatrix, RowLabel};

/// Materializes the sparse aggregate into a dense grid. Rows are ordered by
/// cohort then segment; columns run from offset 0 to the largest observed offset.
pub fn build(table: &AggregateTable, mode: Mode) -> RetentionMatrix {
    if table.is_empty() {
        return RetentionMatrix::empty(mode);
    }

    let rows: Vec<RowLabel> = table
        .cells
        .keys()
        .map(|key| RowLabel {
            cohort: key.cohort,
            segment: key.segment.clone(),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let max_offset = table.cells.keys().map(|key| key.offset).max().unwrap_or(0);
    let offsets: Vec<usize> = (0..=max_offset).collect();

    let values = rows
        .iter()
        .map(|row| {
            let counts: Vec<f64> = offsets
                .iter()
                .map(|offset| {
                    table
                        .count(row.cohort, *offset, row.segment.as_deref())
                        .unwrap_or(0) as f64
                })
                .collect();

            match mode {
                Mode::Absolute => counts,
                Mode::Percentage => to_percentages(&counts),
            }
        })
        .collect();

    RetentionMatrix {
        mode,
        rows,
        offsets,
        values,
    }
}

/// Divides a row by its offset-0 count. A row without a cohort size is all zeros.
fn to_percentages(counts: &[f64]) -> Vec<f64> {
    match counts.first() {
        Some(size) if *size > 0.0 => counts.iter().map(|count| 100.0 * count / size).collect(),
        _ => vec![0.0; counts.len()],
    }
}

/// Mean over the non-zero cells; `None` when there are none to average.
pub fn average_retention(percentage: &RetentionMatrix) -> Option<f64> {
    let (sum, count) = percentage
        .values
        .iter()
        .flatten()
        .filter(|value| **value != 0.0)
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
