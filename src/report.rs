use std::fmt::Write;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, Table};

use crate::dataset::DateRange;
use crate::models::{CohortAnalysis, Mode, RetentionMatrix, RowLabel};

/// Display text for one cell. Zero renders blank: nothing retained and
/// "past the observed horizon" look the same.
pub fn format_cell(value: f64, mode: Mode) -> String {
    if value == 0.0 {
        return String::new();
    }
    match mode {
        Mode::Percentage => format!("{value:.0}%"),
        Mode::Absolute => format!("{value:.0}"),
    }
}

pub fn format_average(average: Option<f64>) -> String {
    average
        .map(|value| format!("{value:.1}%"))
        .unwrap_or_else(|| "N/A".to_string())
}

fn row_label(row: &RowLabel) -> String {
    match &row.segment {
        Some(segment) => format!("{} {}", row.cohort, segment),
        None => row.cohort.to_string(),
    }
}

/// Terminal grid: one row per cohort (and segment), one column per offset.
pub fn render_matrix(matrix: &RetentionMatrix) -> String {
    if matrix.is_empty() {
        return "No data available for analysis.\n".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    let mut header = vec![Cell::new("cohort")];
    header.extend(
        matrix
            .offsets
            .iter()
            .map(|offset| Cell::new(offset).set_alignment(CellAlignment::Right)),
    );
    table.set_header(header);

    for (row, values) in matrix.rows.iter().zip(matrix.values.iter()) {
        let mut cells = vec![Cell::new(row_label(row))];
        cells.extend(values.iter().map(|value| {
            Cell::new(format_cell(*value, matrix.mode)).set_alignment(CellAlignment::Right)
        }));
        table.add_row(cells);
    }

    format!("{table}\n")
}

fn markdown_table<'a>(
    output: &mut String,
    matrix: &RetentionMatrix,
    rows: impl Iterator<Item = (&'a RowLabel, &'a [f64])>,
) {
    let _ = write!(output, "| Cohort |");
    for offset in &matrix.offsets {
        let _ = write!(output, " {offset} |");
    }
    let _ = writeln!(output);
    let _ = write!(output, "|---|");
    for _ in &matrix.offsets {
        let _ = write!(output, "---:|");
    }
    let _ = writeln!(output);

    for (row, values) in rows {
        let _ = write!(output, "| {} |", row.cohort);
        for value in values {
            let _ = write!(output, " {} |", format_cell(*value, matrix.mode));
        }
        let _ = writeln!(output);
    }
}

pub fn build_report(analysis: &CohortAnalysis, mode: Mode, range: Option<DateRange>) -> String {
    let matrix = analysis.matrix(mode);
    let mut output = String::new();

    let _ = writeln!(output, "# Cohort Retention Report");
    let _ = writeln!(output);

    if matrix.is_empty() {
        let _ = writeln!(output, "No data available for analysis.");
        return output;
    }

    let period = match (range, analysis.first_event, analysis.last_event) {
        (Some(range), _, _) => format!("{} to {}", range.start, range.end),
        (None, Some(first), Some(last)) => format!("{first} to {last}"),
        _ => "N/A".to_string(),
    };

    let _ = writeln!(output, "- Total subjects: {}", analysis.total_subjects);
    let _ = writeln!(output, "- Period analyzed: {period}");
    let _ = writeln!(
        output,
        "- Average retention: {}",
        format_average(analysis.average_retention)
    );
    let _ = writeln!(output);

    let heading = match mode {
        Mode::Percentage => "Retention (%) by months since acquisition",
        Mode::Absolute => "Active subjects by months since acquisition",
    };
    let _ = writeln!(output, "## {heading}");

    let segments = matrix.segments();
    if segments.is_empty() {
        let _ = writeln!(output);
        markdown_table(&mut output, matrix, matrix.rows_for_segment(None));
    } else {
        for segment in segments {
            let _ = writeln!(output);
            let _ = writeln!(output, "### Segment: {segment}");
            let _ = writeln!(output);
            markdown_table(&mut output, matrix, matrix.rows_for_segment(Some(segment)));
        }
    }

    output
}

pub fn to_json(analysis: &CohortAnalysis) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(analysis)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::analyze;
    use crate::models::Event;
    use chrono::NaiveDate;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn sample() -> CohortAnalysis {
        analyze(
            &[
                Event::new("u1", date(2023, 1, 15)).with_segment("ads"),
                Event::new("u1", date(2023, 3, 2)).with_segment("ads"),
                Event::new("u2", date(2023, 1, 20)).with_segment("ads"),
                Event::new("u3", date(2023, 2, 2)).with_segment("organic"),
            ],
            true,
        )
    }

    #[test]
    fn zero_cells_render_blank() {
        assert_eq!(format_cell(0.0, Mode::Percentage), "");
        assert_eq!(format_cell(50.0, Mode::Percentage), "50%");
        assert_eq!(format_cell(3.0, Mode::Absolute), "3");
        assert_eq!(format_average(None), "N/A");
        assert_eq!(format_average(Some(62.54)), "62.5%");
    }

    #[test]
    fn grid_lists_each_row() {
        let grid = render_matrix(&sample().percentage);
        let header = grid
            .lines()
            .find(|line| line.contains("cohort"))
            .expect("header row");
        assert!(header.contains('0') && header.contains('2'));

        let ads = grid
            .lines()
            .find(|line| line.contains("2023-01 ads"))
            .expect("ads row");
        assert!(ads.contains("100%"));
        assert!(ads.contains("50%"));

        let organic = grid
            .lines()
            .find(|line| line.contains("2023-02 organic"))
            .expect("organic row");
        assert!(organic.contains("100%"));
        assert!(!organic.contains("0%|") && !organic.contains(" 0%"));
    }

    #[test]
    fn report_has_one_table_per_segment() {
        let analysis = sample();
        let report = build_report(&analysis, Mode::Absolute, None);

        assert!(report.contains("- Total subjects: 3"));
        assert!(report.contains("- Period analyzed: 2023-01-15 to 2023-03-02"));
        assert!(report.contains("### Segment: ads"));
        assert!(report.contains("### Segment: organic"));
        assert!(report.contains("| 2023-01 | 2 |  | 1 |"));
    }

    #[test]
    fn empty_analysis_renders_placeholder() {
        let analysis = analyze(&[], false);
        let report = build_report(&analysis, Mode::Percentage, None);
        assert!(report.contains("No data available for analysis."));
        assert_eq!(render_matrix(&analysis.absolute), "No data available for analysis.\n");
    }

    #[test]
    fn json_marks_missing_average_as_null() {
        let json = to_json(&analyze(&[], false)).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert!(value["average_retention"].is_null());
        assert_eq!(value["percentage"]["mode"], "percentage");

        let json = to_json(&sample()).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["absolute"]["rows"][0]["cohort"], "2023-01");
        assert_eq!(value["absolute"]["rows"][0]["segment"], "ads");
    }
}
