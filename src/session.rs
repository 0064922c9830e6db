//! Session workspace
//!
//! Holds the three uploaded inputs (POS tables, calendar features, attendance
//! matrices) and drives the forecast flow once all of them are present. Loads
//! replace the previous upload wholesale, and only after the new data parsed
//! cleanly; a failed load leaves the workspace untouched.

use chrono::NaiveDate;
use polars::prelude::DataFrame;

use crate::calendar;
use crate::error::{Error, Result};
use crate::model::{self, Forecast};
use crate::pos::{self, PosTables};
use crate::series::{self, BusinessHours};
use crate::split;
use crate::syllabus::SyllabusPair;

/// All session state of one user. Each slot is empty until its upload
/// succeeds; uploads are independent and last-writer-wins.
#[derive(Debug, Default)]
pub struct Workspace {
    pos: Option<PosTables>,
    calendar: Option<DataFrame>,
    syllabus: Option<SyllabusPair>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clean and normalize raw POS exports into the session. Any number of
    /// export batches per table kind; the whole set replaces the previous one.
    pub fn load_pos(
        &mut self,
        checkouts: &[DataFrame],
        items: &[DataFrame],
        payments: &[DataFrame],
    ) -> Result<()> {
        self.pos = Some(pos::normalize(checkouts, items, payments)?);
        Ok(())
    }

    /// Derive and store the calendar features from a raw calendar table.
    pub fn load_calendar(&mut self, raw: &DataFrame, max_term_weeks: i32) -> Result<()> {
        self.calendar = Some(calendar::build_features(raw, max_term_weeks)?);
        Ok(())
    }

    /// Parse and store the attendance matrices of both campuses.
    pub fn load_syllabus(&mut self, west: &DataFrame, east: &DataFrame) -> Result<()> {
        self.syllabus = Some(SyllabusPair::from_frames(west, east)?);
        Ok(())
    }

    pub fn pos(&self) -> Option<&PosTables> {
        self.pos.as_ref()
    }

    pub fn calendar(&self) -> Option<&DataFrame> {
        self.calendar.as_ref()
    }

    pub fn syllabus(&self) -> Option<&SyllabusPair> {
        self.syllabus.as_ref()
    }

    /// Dates covered by the loaded POS data for one store, for upload
    /// summaries.
    pub fn pos_span(&self, store: &str) -> Option<(NaiveDate, NaiveDate)> {
        let tables = self.pos.as_ref()?;
        pos::date_span(&tables.customers, store).ok().flatten()
    }

    /// Names of the inputs still missing before a forecast can run.
    pub fn missing_prerequisites(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.pos.is_none() {
            missing.push("POS data");
        }
        if self.calendar.is_none() {
            missing.push("calendar data");
        }
        if self.syllabus.is_none() {
            missing.push("attendance data");
        }
        missing
    }

    /// Run the whole forecast flow for one store: daily counts, feature
    /// assembly, train/predict split, model fit.
    ///
    /// # Errors
    /// * `MissingPrerequisite` when an upload slot is still empty
    /// * every downstream error of the pipeline stages, unchanged
    pub fn forecast(
        &self,
        store: &str,
        hours: BusinessHours,
        validation_ratio: f64,
    ) -> Result<Forecast> {
        let missing = self.missing_prerequisites();
        if !missing.is_empty() {
            return Err(Error::MissingPrerequisite(missing.join(", ")));
        }
        let (Some(tables), Some(calendar), Some(syllabus)) =
            (&self.pos, &self.calendar, &self.syllabus)
        else {
            return Err(Error::MissingPrerequisite("session data".to_string()));
        };
        let Some(matrix) = syllabus.for_store(store) else {
            return Err(Error::Malformed(format!("unknown store `{store}`")));
        };

        let daily = series::daily_customer_counts(&tables.customers, store, hours)?;
        let assembled = series::assemble(&daily, calendar, matrix)?;
        let split = split::split_train_predict(&assembled)?;
        model::fit_and_forecast(&split, validation_ratio)
    }
}
