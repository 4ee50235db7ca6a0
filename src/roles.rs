use std::collections::HashSet;

use serde::Serialize;

use crate::dataset::{parse_date, RoleBindings, Table};
use crate::error::DatasetError;

pub const DATE_RATIO_THRESHOLD: f64 = 0.5;
pub const MAX_SEGMENT_VALUES: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub distinct: usize,
    pub missing: usize,
    pub date_ratio: f64,
    pub numeric: bool,
}

impl ColumnProfile {
    fn from_column<'a>(name: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let mut seen = HashSet::new();
        let mut total = 0usize;
        let mut missing = 0usize;
        let mut dates = 0usize;
        let mut numeric = true;

        for value in values {
            total += 1;
            let value = value.trim();
            if value.is_empty() {
                missing += 1;
                continue;
            }
            if parse_date(value).is_some() {
                dates += 1;
            }
            if value.parse::<f64>().is_err() {
                numeric = false;
            }
            seen.insert(value);
        }

        Self {
            name: name.to_string(),
            distinct: seen.len(),
            missing,
            date_ratio: if total == 0 {
                0.0
            } else {
                dates as f64 / total as f64
            },
            numeric: numeric && !seen.is_empty(),
        }
    }
}

pub fn profile(table: &Table) -> Vec<ColumnProfile> {
    table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnProfile::from_column(name, table.column(idx)))
        .collect()
}

/// Columns usable as subject identifiers: fully populated and not constant.
pub fn identifier_candidates(profiles: &[ColumnProfile]) -> Vec<&str> {
    profiles
        .iter()
        .filter(|column| column.missing == 0 && column.distinct > 1)
        .map(|column| column.name.as_str())
        .collect()
}

pub fn date_candidates<'a>(
    profiles: &'a [ColumnProfile],
    exclude: &[&str],
    threshold: f64,
) -> Vec<&'a str> {
    profiles
        .iter()
        .filter(|column| !exclude.contains(&column.name.as_str()))
        .filter(|column| column.date_ratio >= threshold)
        .map(|column| column.name.as_str())
        .collect()
}

/// Low-cardinality text columns that can slice cohorts. Date-like columns are
/// left out as well, even when they are not the chosen date column.
pub fn segment_candidates<'a>(profiles: &'a [ColumnProfile], exclude: &[&str]) -> Vec<&'a str> {
    profiles
        .iter()
        .filter(|column| !exclude.contains(&column.name.as_str()))
        .filter(|column| column.distinct < MAX_SEGMENT_VALUES && !column.numeric)
        .filter(|column| column.date_ratio < DATE_RATIO_THRESHOLD)
        .map(|column| column.name.as_str())
        .collect()
}

/// Suggests column roles for a caller that has not named them.
pub trait RoleHeuristic {
    fn suggest_subject<'a>(&self, candidates: &[&'a str]) -> Option<&'a str>;
    fn suggest_date<'a>(&self, candidates: &[&'a str]) -> Option<&'a str>;
}

#[derive(Debug, Clone)]
pub struct KeywordHeuristic {
    pub subject_keywords: Vec<String>,
    pub date_names: Vec<String>,
}

impl Default for KeywordHeuristic {
    fn default() -> Self {
        Self {
            subject_keywords: ["id", "usuario", "user", "client", "customer"]
                .into_iter()
                .map(String::from)
                .collect(),
            date_names: ["data", "Data", "date", "Date"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl RoleHeuristic for KeywordHeuristic {
    fn suggest_subject<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .find(|name| {
                let lower = name.to_lowercase();
                self.subject_keywords
                    .iter()
                    .any(|keyword| lower.contains(&keyword.to_lowercase()))
            })
            .or_else(|| candidates.first())
            .copied()
    }

    fn suggest_date<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .find(|name| self.date_names.iter().any(|date_name| date_name == *name))
            .or_else(|| candidates.first())
            .copied()
    }
}

/// Column names the caller asked for; anything left out is suggested.
#[derive(Debug, Clone, Default)]
pub struct RequestedRoles {
    pub subject: Option<String>,
    pub date: Option<String>,
    pub segment: Option<String>,
}

pub fn resolve_roles(
    table: &Table,
    requested: &RequestedRoles,
    heuristic: &dyn RoleHeuristic,
) -> Result<RoleBindings, DatasetError> {
    let profiles = profile(table);

    let subject = match &requested.subject {
        Some(name) => {
            let column = &profiles[table.column_index(name)?];
            if !identifier_candidates(&profiles).contains(&name.as_str()) {
                return Err(DatasetError::InvalidSubjectColumn {
                    column: name.clone(),
                    missing: column.missing,
                    distinct: column.distinct,
                });
            }
            name.clone()
        }
        None => heuristic
            .suggest_subject(&identifier_candidates(&profiles))
            .ok_or(DatasetError::NoIdentifierColumn)?
            .to_string(),
    };

    let date = match &requested.date {
        Some(name) => {
            let idx = table.column_index(name)?;
            let ratio = profiles[idx].date_ratio;
            if ratio < DATE_RATIO_THRESHOLD {
                return Err(DatasetError::InvalidDateColumn {
                    column: name.clone(),
                    ratio,
                });
            }
            name.clone()
        }
        None => {
            let candidates = date_candidates(&profiles, &[subject.as_str()], DATE_RATIO_THRESHOLD);
            heuristic
                .suggest_date(&candidates)
                .ok_or(DatasetError::NoValidDateColumn)?
                .to_string()
        }
    };

    if let Some(segment) = &requested.segment {
        let column = &profiles[table.column_index(segment)?];
        let allowed = segment_candidates(&profiles, &[subject.as_str(), date.as_str()]);
        if !allowed.contains(&segment.as_str()) {
            return Err(DatasetError::InvalidSegmentColumn {
                column: segment.clone(),
                distinct: column.distinct,
            });
        }
    }

    tracing::debug!(subject = %subject, date = %date, segment = ?requested.segment, "column roles resolved");

    Ok(RoleBindings {
        subject,
        date,
        segment: requested.segment.clone(),
    })
}
