use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

/// A calendar month. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Whole calendar months from `earlier` to `self`; negative when `earlier` is later.
    pub fn months_since(&self, earlier: Month) -> i64 {
        (self.year as i64 - earlier.year as i64) * 12 + (self.month as i64 - earlier.month as i64)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub subject_id: String,
    pub occurred_on: NaiveDate,
    pub segment: Option<String>,
}

impl Event {
    pub fn new(subject_id: impl Into<String>, occurred_on: NaiveDate) -> Self {
        Self {
            subject_id: subject_id.into(),
            occurred_on,
            segment: None,
        }
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }
}

/// Every calendar month from the earliest cohort to the latest event, without gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodIndex {
    months: Vec<Month>,
    positions: BTreeMap<Month, usize>,
}

impl PeriodIndex {
    pub fn spanning(first: Month, last: Month) -> Self {
        let mut months = Vec::new();
        let mut current = first;
        while current <= last {
            months.push(current);
            current = current.succ();
        }

        let positions = months
            .iter()
            .enumerate()
            .map(|(position, month)| (*month, position))
            .collect();

        Self { months, positions }
    }

    pub fn position(&self, month: Month) -> Option<usize> {
        self.positions.get(&month).copied()
    }

    pub fn months(&self) -> &[Month] {
        &self.months
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub cohort: Month,
    pub offset: usize,
    pub segment: Option<String>,
}

/// Sparse distinct-subject counts. Combinations with no subjects are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateTable {
    pub periods: PeriodIndex,
    pub cells: BTreeMap<CellKey, usize>,
    pub segmented: bool,
}

impl AggregateTable {
    pub fn count(&self, cohort: Month, offset: usize, segment: Option<&str>) -> Option<usize> {
        let key = CellKey {
            cohort,
            offset,
            segment: segment.map(str::to_string),
        };
        self.cells.get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RowLabel {
    pub cohort: Month,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Absolute,
    Percentage,
}

/// Dense cohort × offset grid. A zero cell means either nothing retained or
/// an offset past the cohort's observed horizon; the two are not told apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionMatrix {
    pub mode: Mode,
    pub rows: Vec<RowLabel>,
    pub offsets: Vec<usize>,
    pub values: Vec<Vec<f64>>,
}

impl RetentionMatrix {
    pub fn empty(mode: Mode) -> Self {
        Self {
            mode,
            rows: Vec::new(),
            offsets: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: &RowLabel, offset: usize) -> Option<f64> {
        let row_idx = self.rows.iter().position(|label| label == row)?;
        self.values.get(row_idx)?.get(offset).copied()
    }

    /// Distinct segment values, ascending. Empty for unsegmented matrices.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self
            .rows
            .iter()
            .filter_map(|row| row.segment.as_deref())
            .collect();
        segments.sort_unstable();
        segments.dedup();
        segments
    }

    pub fn rows_for_segment<'a>(
        &'a self,
        segment: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a RowLabel, &'a [f64])> + 'a {
        self.rows
            .iter()
            .zip(self.values.iter())
            .filter(move |(row, _)| row.segment.as_deref() == segment)
            .map(|(row, values)| (row, values.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortAnalysis {
    pub total_subjects: usize,
    pub first_event: Option<NaiveDate>,
    pub last_event: Option<NaiveDate>,
    pub average_retention: Option<f64>,
    pub absolute: RetentionMatrix,
    pub percentage: RetentionMatrix,
}

impl CohortAnalysis {
    pub fn matrix(&self, mode: Mode) -> &RetentionMatrix {
        match mode {
            Mode::Absolute => &self.absolute,
            Mode::Percentage => &self.percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(year: i32, month: u32) -> Month {
        Month::new(year, month).expect("valid month")
    }

    #[test]
    fn month_rolls_over_year_end() {
        assert_eq!(month(2023, 12).succ(), month(2024, 1));
        assert_eq!(month(2024, 3).months_since(month(2023, 11)), 4);
        assert_eq!(month(2023, 11).months_since(month(2024, 3)), -4);
        assert!(Month::new(2024, 13).is_none());
    }

    #[test]
    fn month_displays_as_year_and_month() {
        assert_eq!(month(2023, 2).to_string(), "2023-02");
        assert_eq!(
            serde_json::to_string(&month(2023, 2)).expect("serialize"),
            "\"2023-02\""
        );
    }

    #[test]
    fn period_index_has_no_gaps() {
        let index = PeriodIndex::spanning(month(2023, 11), month(2024, 2));
        assert_eq!(index.len(), 4);
        assert_eq!(index.position(month(2023, 12)), Some(1));
        assert_eq!(index.position(month(2024, 2)), Some(3));
        assert_eq!(index.position(month(2024, 3)), None);
    }

    #[test]
    fn segment_blocks_are_sorted_and_distinct() {
        let matrix = RetentionMatrix {
            mode: Mode::Absolute,
            rows: vec![
                RowLabel {
                    cohort: month(2023, 1),
                    segment: Some("web".into()),
                },
                RowLabel {
                    cohort: month(2023, 1),
                    segment: Some("ads".into()),
                },
                RowLabel {
                    cohort: month(2023, 2),
                    segment: Some("web".into()),
                },
            ],
            offsets: vec![0],
            values: vec![vec![3.0], vec![1.0], vec![2.0]],
        };

        assert_eq!(matrix.segments(), vec!["ads", "web"]);
        let web: Vec<f64> = matrix
            .rows_for_segment(Some("web"))
            .map(|(_, values)| values[0])
            .collect();
        assert_eq!(web, vec![3.0, 2.0]);
    }
}
