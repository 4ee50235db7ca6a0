use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column `{0}` not found in dataset")]
    UnknownColumn(String),

    #[error("no valid date column found")]
    NoValidDateColumn,

    #[error("column `{column}` is not a date column ({:.0}% of values parse as dates)", .ratio * 100.0)]
    InvalidDateColumn { column: String, ratio: f64 },

    #[error("column `{column}` cannot identify subjects ({missing} missing, {distinct} distinct values)")]
    InvalidSubjectColumn {
        column: String,
        missing: usize,
        distinct: usize,
    },

    #[error("column `{column}` is not a categorical segment column ({distinct} distinct values)")]
    InvalidSegmentColumn { column: String, distinct: usize },

    #[error("dataset has no usable identifier column")]
    NoIdentifierColumn,
}
