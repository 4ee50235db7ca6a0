use std::path::Path;

use anyhow::Context;
use chrono::{Months, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::dataset::Table;

pub const SEED: u64 = 42;
pub const SUBJECTS: u32 = 500;
pub const CACHE_FILE: &str = "synthetic_data.csv";

const SOURCES: [(&str, f64); 3] = [("organic", 0.6), ("ads", 0.3), ("referral", 0.1)];
const PLANS: [(&str, f64); 2] = [("free", 0.8), ("premium", 0.2)];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticRow {
    pub user_id: u32,
    pub date: NaiveDate,
    pub source: &'static str,
    pub plan: &'static str,
}

/// The twelve month-end dates of 2023 that signups are drawn from.
fn signup_dates() -> anyhow::Result<Vec<NaiveDate>> {
    (1..=12)
        .map(|month| {
            NaiveDate::from_ymd_opt(2023, month, 1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .and_then(|next| next.pred_opt())
                .context("invalid signup date")
        })
        .collect()
}

fn weighted<const N: usize>(
    choices: &[(&'static str, f64); N],
) -> anyhow::Result<(WeightedIndex<f64>, [&'static str; N])> {
    let index = WeightedIndex::new(choices.iter().map(|(_, weight)| *weight))
        .context("invalid choice weights")?;
    Ok((index, choices.map(|(label, _)| label)))
}

/// Deterministic activity log: each subject signs up at a month end and stays
/// active for a random run of consecutive months, cut off at the end of 2023.
pub fn generate() -> anyhow::Result<Vec<SyntheticRow>> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let signups = signup_dates()?;
    let horizon = *signups.last().context("no signup dates")?;
    let (source_index, sources) = weighted(&SOURCES)?;
    let (plan_index, plans) = weighted(&PLANS)?;

    let mut rows = Vec::new();
    for user_id in 1..=SUBJECTS {
        let signup = signups[rng.gen_range(0..signups.len())];
        let source = sources[source_index.sample(&mut rng)];
        let plan = plans[plan_index.sample(&mut rng)];
        let active_months: u32 = rng.gen_range(1..12);

        for offset in 0..active_months {
            let date = signup
                .checked_add_months(Months::new(offset))
                .context("activity date out of range")?;
            if date > horizon {
                break;
            }
            rows.push(SyntheticRow {
                user_id,
                date,
                source,
                plan,
            });
        }
    }

    tracing::debug!(rows = rows.len(), subjects = SUBJECTS, "synthetic dataset generated");
    Ok(rows)
}

pub fn write_csv(rows: &[SyntheticRow], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads the cached synthetic dataset from `dir`, generating and caching it first
/// when missing.
pub fn load_or_generate(dir: &Path) -> anyhow::Result<Table> {
    let path = dir.join(CACHE_FILE);
    if path.exists() {
        tracing::info!(path = %path.display(), "using cached synthetic dataset");
        return Table::from_path(&path).context("failed to read cached synthetic dataset");
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create dataset directory {}", dir.display()))?;
    let rows = generate()?;
    write_csv(&rows, &path)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "synthetic dataset cached");

    Table::from_path(&path).context("failed to read generated synthetic dataset")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn signups_are_month_ends() {
        let dates = signup_dates().expect("dates");
        assert_eq!(dates.len(), 12);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2023, 1, 31).expect("date"));
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2023, 2, 28).expect("date"));
        assert_eq!(dates[11], NaiveDate::from_ymd_opt(2023, 12, 31).expect("date"));
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(generate().expect("first"), generate().expect("second"));
    }

    #[test]
    fn every_subject_starts_at_signup_and_stays_in_2023() {
        let rows = generate().expect("generate");
        let horizon = NaiveDate::from_ymd_opt(2023, 12, 31).expect("date");
        let signups = signup_dates().expect("dates");

        let mut first_seen: BTreeMap<u32, NaiveDate> = BTreeMap::new();
        for row in &rows {
            assert!(row.date <= horizon);
            first_seen.entry(row.user_id).or_insert(row.date);
        }

        assert_eq!(first_seen.len(), SUBJECTS as usize);
        assert!(first_seen.values().all(|date| signups.contains(date)));
    }

    #[test]
    fn caches_to_disk_and_reuses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = load_or_generate(dir.path()).expect("generate");
        assert!(dir.path().join(CACHE_FILE).exists());
        assert_eq!(first.headers, vec!["user_id", "date", "source", "plan"]);

        let second = load_or_generate(dir.path()).expect("reload");
        assert_eq!(first, second);
    }
}
