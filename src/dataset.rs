use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::DatasetError;
use crate::models::Event;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses the date part of a cell. Unparseable values are treated as missing.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.date());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    // Year-month only, e.g. "2023-04". `%Y` takes any digit count, so check the shape first.
    let bytes = raw.as_bytes();
    let year_month = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit);
    if !year_month {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok()
}

/// Inclusive date window applied before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Explicit column roles; the core never guesses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBindings {
    pub subject: String,
    pub date: String,
    pub segment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = table.rows.len(),
            columns = table.headers.len(),
            "dataset loaded"
        );
        Ok(table)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row = (0..headers.len())
                .map(|idx| record.get(idx).unwrap_or("").to_string())
                .collect();
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DatasetError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |row| row[idx].as_str())
    }

    pub fn date_bounds(&self, column: &str) -> Result<Option<DateRange>, DatasetError> {
        let idx = self.column_index(column)?;
        let dates: Vec<NaiveDate> = self.column(idx).filter_map(parse_date).collect();

        Ok(match (dates.iter().min(), dates.iter().max()) {
            (Some(start), Some(end)) => Some(DateRange {
                start: *start,
                end: *end,
            }),
            _ => None,
        })
    }

    /// Turns rows into events under the given roles. Rows with a blank subject
    /// or an unparseable date are dropped; a blank segment becomes `None`.
    pub fn events(
        &self,
        roles: &RoleBindings,
        range: Option<DateRange>,
    ) -> Result<Vec<Event>, DatasetError> {
        let subject_idx = self.column_index(&roles.subject)?;
        let date_idx = self.column_index(&roles.date)?;
        let segment_idx = roles
            .segment
            .as_deref()
            .map(|segment| self.column_index(segment))
            .transpose()?;

        let mut events = Vec::with_capacity(self.rows.len());
        let mut invalid = 0usize;
        let mut filtered = 0usize;

        for row in &self.rows {
            let subject_id = row[subject_idx].trim();
            let Some(occurred_on) = parse_date(&row[date_idx]) else {
                invalid += 1;
                continue;
            };
            if subject_id.is_empty() {
                invalid += 1;
                continue;
            }
            if range.is_some_and(|range| !range.contains(occurred_on)) {
                filtered += 1;
                continue;
            }

            let segment = segment_idx
                .map(|idx| row[idx].trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string);

            events.push(Event {
                subject_id: subject_id.to_string(),
                occurred_on,
                segment,
            });
        }

        if invalid > 0 {
            tracing::warn!(invalid, column = %roles.date, "rows without subject id or parseable date skipped");
        }
        tracing::debug!(kept = events.len(), filtered, "events extracted");

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    const SAMPLE: &str = "\
user_id,date,source
1,2023-01-31,ads
1,2023-02-28 10:15:00,ads
2,not a date,organic
,2023-01-05,organic
3,2023/03/01,
";

    fn roles(segment: Option<&str>) -> RoleBindings {
        RoleBindings {
            subject: "user_id".to_string(),
            date: "date".to_string(),
            segment: segment.map(str::to_string),
        }
    }

    #[test]
    fn parses_common_date_shapes() {
        assert_eq!(parse_date("2023-04-05"), Some(date(2023, 4, 5)));
        assert_eq!(parse_date("2023-04-05T23:10:00Z"), Some(date(2023, 4, 5)));
        assert_eq!(parse_date("2023-04-05 08:00:00"), Some(date(2023, 4, 5)));
        assert_eq!(parse_date("04/05/2023"), Some(date(2023, 4, 5)));
        assert_eq!(parse_date("2023-04"), Some(date(2023, 4, 1)));
        assert_eq!(parse_date("ads"), None);
        assert_eq!(parse_date("5-3"), None);
        assert_eq!(parse_date("12-2024"), None);
        assert_eq!(parse_date("2023-4"), None);
        assert_eq!(parse_date("  "), None);
    }

    #[test]
    fn skips_rows_without_subject_or_date() {
        let table = Table::from_reader(SAMPLE.as_bytes()).expect("csv parses");
        let events = table.events(&roles(Some("source")), None).expect("roles resolve");

        assert_eq!(events.len(), 3);
        assert_eq!(events[1].occurred_on, date(2023, 2, 28));
        assert_eq!(events[0].segment.as_deref(), Some("ads"));
        assert_eq!(events[2].segment, None);
    }

    #[test]
    fn range_filter_is_inclusive() {
        let table = Table::from_reader(SAMPLE.as_bytes()).expect("csv parses");
        let range = DateRange {
            start: date(2023, 2, 28),
            end: date(2023, 3, 1),
        };
        let events = table.events(&roles(None), Some(range)).expect("roles resolve");

        let subjects: Vec<&str> = events.iter().map(|e| e.subject_id.as_str()).collect();
        assert_eq!(subjects, vec!["1", "3"]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let table = Table::from_reader(SAMPLE.as_bytes()).expect("csv parses");
        let err = table
            .events(&roles(Some("plan")), None)
            .expect_err("plan is missing");
        assert!(matches!(err, DatasetError::UnknownColumn(name) if name == "plan"));
    }

    #[test]
    fn date_bounds_cover_parseable_values() {
        let table = Table::from_reader(SAMPLE.as_bytes()).expect("csv parses");
        let bounds = table.date_bounds("date").expect("column exists");
        assert_eq!(
            bounds,
            Some(DateRange {
                start: date(2023, 1, 5),
                end: date(2023, 3, 1),
            })
        );
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.csv");
        std::fs::write(&path, SAMPLE).expect("write sample");

        let table = Table::from_path(&path).expect("load");
        assert_eq!(table.headers, vec!["user_id", "date", "source"]);
        assert_eq!(table.rows.len(), 5);
    }
}
