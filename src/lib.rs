//! Monthly cohort retention: groups subjects by the month of their first event,
//! counts who comes back in each following month, and renders the result.

pub mod cohort;
pub mod dataset;
pub mod error;
pub mod matrix;
pub mod models;
pub mod report;
pub mod roles;
pub mod synthetic;
pub mod telemetry;
