use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::matrix;
use crate::models::{AggregateTable, CellKey, CohortAnalysis, Event, Mode, Month, PeriodIndex};

/// Grouping key for cohort assignment: the subject, plus its segment when segmenting.
pub type SubjectKey<'a> = (&'a str, Option<&'a str>);

/// Events that take part in aggregation. With segmentation on, events lacking a
/// segment value have no group and are left out.
fn eligible(events: &[Event], segment_enabled: bool) -> impl Iterator<Item = &Event> {
    events
        .iter()
        .filter(move |event| !segment_enabled || event.segment.is_some())
}

fn subject_key(event: &Event, segment_enabled: bool) -> SubjectKey<'_> {
    let segment = if segment_enabled {
        event.segment.as_deref()
    } else {
        None
    };
    (event.subject_id.as_str(), segment)
}

/// Cohort month per subject (per subject and segment when segmenting): the month
/// of the group's earliest event.
pub fn cohort_assignments(events: &[Event], segment_enabled: bool) -> HashMap<SubjectKey<'_>, Month> {
    let mut cohorts: HashMap<SubjectKey<'_>, Month> = HashMap::new();

    for event in eligible(events, segment_enabled) {
        let month = Month::from_date(event.occurred_on);
        cohorts
            .entry(subject_key(event, segment_enabled))
            .and_modify(|cohort| *cohort = (*cohort).min(month))
            .or_insert(month);
    }

    cohorts
}

pub fn aggregate(events: &[Event], segment_enabled: bool) -> AggregateTable {
    let skipped = events.len() - eligible(events, segment_enabled).count();
    if skipped > 0 {
        tracing::debug!(skipped, "events without a segment left out of segmented aggregation");
    }

    let cohorts = cohort_assignments(events, segment_enabled);
    let (Some(first), Some(last)) = (
        cohorts.values().min().copied(),
        eligible(events, segment_enabled)
            .map(|event| Month::from_date(event.occurred_on))
            .max(),
    ) else {
        return AggregateTable {
            segmented: segment_enabled,
            ..AggregateTable::default()
        };
    };

    let periods = PeriodIndex::spanning(first, last);
    let mut subjects: BTreeMap<CellKey, HashSet<&str>> = BTreeMap::new();

    for event in eligible(events, segment_enabled) {
        let key = subject_key(event, segment_enabled);
        let order_month = Month::from_date(event.occurred_on);

        // Every eligible event has a cohort, and both months fall inside `first..=last`.
        let Some(&cohort) = cohorts.get(&key) else {
            continue;
        };
        let (Some(order_idx), Some(cohort_idx)) =
            (periods.position(order_month), periods.position(cohort))
        else {
            continue;
        };

        subjects
            .entry(CellKey {
                cohort,
                offset: order_idx - cohort_idx,
                segment: key.1.map(str::to_string),
            })
            .or_default()
            .insert(key.0);
    }

    let cells = subjects
        .into_iter()
        .map(|(key, ids)| (key, ids.len()))
        .collect();

    AggregateTable {
        periods,
        cells,
        segmented: segment_enabled,
    }
}

/// Aggregates once and derives both matrices and the headline metrics.
pub fn analyze(events: &[Event], segment_enabled: bool) -> CohortAnalysis {
    let table = aggregate(events, segment_enabled);
    let absolute = matrix::build(&table, Mode::Absolute);
    let percentage = matrix::build(&table, Mode::Percentage);
    let average_retention = matrix::average_retention(&percentage);

    let total_subjects = events
        .iter()
        .map(|event| event.subject_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    tracing::info!(
        events = events.len(),
        subjects = total_subjects,
        cohorts = absolute.rows.len(),
        offsets = absolute.offsets.len(),
        "cohort table computed"
    );

    CohortAnalysis {
        total_subjects,
        first_event: events.iter().map(|event| event.occurred_on).min(),
        last_event: events.iter().map(|event| event.occurred_on).max(),
        average_retention,
        absolute,
        percentage,
    }
}
