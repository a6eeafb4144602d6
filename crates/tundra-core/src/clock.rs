//! Stage clock: the year and month position of a cohort run.
//!
//! The clock tracks three counters: a global year index that grows
//! monotonically across every stage of one cohort run, a stage year index
//! that restarts at each stage entry, and a month index within the year.
//! The calendar year and output-year index are derived from them, never
//! stored.
//!
//! All counter updates use checked arithmetic.

use tundra_types::{MONTHS_PER_YEAR, Stage};

/// Days in each month of the (non-leap) model year.
pub const DAYS_IN_MONTH: [u32; MONTHS_PER_YEAR] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// A counter would overflow.
    #[error("clock overflow in {stage} at stage year {stage_year_index}")]
    Overflow {
        /// Stage being run.
        stage: Stage,
        /// Stage year index at the time.
        stage_year_index: usize,
    },
}

/// Days in a month, or `None` for a month index outside `0..12`.
pub fn days_in_month(month: usize) -> Option<u32> {
    DAYS_IN_MONTH.get(month).copied()
}

/// Year/month position of one cohort run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageClock {
    stage: Stage,
    begin_year: i32,
    year_index: usize,
    stage_year_index: usize,
    month: usize,
    output_start_year: Option<i32>,
}

impl StageClock {
    /// A clock positioned at the first month of equilibrium year 0.
    ///
    /// `output_start_year` limits which calendar years are output years.
    pub const fn new(output_start_year: Option<i32>) -> Self {
        Self {
            stage: Stage::Equilibrium,
            begin_year: 0,
            year_index: 0,
            stage_year_index: 0,
            month: 0,
            output_start_year,
        }
    }

    /// Enter a stage whose first calendar year is `begin_year`.
    ///
    /// Resets the stage year and month counters. The global year index is
    /// not reset.
    pub const fn enter_stage(&mut self, stage: Stage, begin_year: i32) {
        self.stage = stage;
        self.begin_year = begin_year;
        self.stage_year_index = 0;
        self.month = 0;
    }

    /// Advance one month, rolling over into the next year after month 11.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if a year counter would overflow.
    pub fn advance_one_month(&mut self) -> Result<(), ClockError> {
        let next = self.month.checked_add(1).ok_or_else(|| self.overflow())?;
        if next < MONTHS_PER_YEAR {
            self.month = next;
            return Ok(());
        }
        self.month = 0;
        self.stage_year_index = self
            .stage_year_index
            .checked_add(1)
            .ok_or_else(|| self.overflow())?;
        self.year_index = self
            .year_index
            .checked_add(1)
            .ok_or_else(|| self.overflow())?;
        Ok(())
    }

    /// Current stage.
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Global year index.
    pub const fn year_index(&self) -> usize {
        self.year_index
    }

    /// Year index within the current stage.
    pub const fn stage_year_index(&self) -> usize {
        self.stage_year_index
    }

    /// Month index (0-11).
    pub const fn month(&self) -> usize {
        self.month
    }

    /// Calendar year: stage begin year plus stage year index.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the year does not fit in `i32`.
    pub fn calendar_year(&self) -> Result<i32, ClockError> {
        i32::try_from(self.stage_year_index)
            .ok()
            .and_then(|offset| self.begin_year.checked_add(offset))
            .ok_or_else(|| self.overflow())
    }

    /// Output-year index of the current year, or `None` if the year is
    /// before the output start year.
    ///
    /// Without an output start year, the global year index is used.
    pub fn output_year_index(&self) -> Option<usize> {
        match self.output_start_year {
            None => Some(self.year_index),
            Some(start) => {
                let year = self.calendar_year().ok()?;
                usize::try_from(year.checked_sub(start)?).ok()
            }
        }
    }

    const fn overflow(&self) -> ClockError {
        ClockError::Overflow {
            stage: self.stage,
            stage_year_index: self.stage_year_index,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn twelve_months_make_a_year() {
        let mut clock = StageClock::new(None);
        for _ in 0..11 {
            clock.advance_one_month().unwrap();
        }
        assert_eq!(clock.month(), 11);
        assert_eq!(clock.year_index(), 0);
        clock.advance_one_month().unwrap();
        assert_eq!(clock.month(), 0);
        assert_eq!(clock.year_index(), 1);
        assert_eq!(clock.stage_year_index(), 1);
    }

    #[test]
    fn entering_a_stage_resets_stage_counters_only() {
        let mut clock = StageClock::new(None);
        for _ in 0..30 {
            clock.advance_one_month().unwrap();
        }
        clock.enter_stage(Stage::Transient, 1901);
        assert_eq!(clock.stage(), Stage::Transient);
        assert_eq!(clock.stage_year_index(), 0);
        assert_eq!(clock.month(), 0);
        assert_eq!(clock.year_index(), 2);
        assert_eq!(clock.calendar_year().unwrap(), 1901);
    }

    #[test]
    fn equilibrium_calendar_year_is_stage_year_index() {
        let mut clock = StageClock::new(None);
        for _ in 0..(12 * 5) {
            clock.advance_one_month().unwrap();
        }
        assert_eq!(clock.calendar_year().unwrap(), 5);
    }

    #[test]
    fn output_years_start_at_configured_year() {
        let mut clock = StageClock::new(Some(1950));
        clock.enter_stage(Stage::Transient, 1948);
        assert_eq!(clock.output_year_index(), None);
        for _ in 0..24 {
            clock.advance_one_month().unwrap();
        }
        assert_eq!(clock.calendar_year().unwrap(), 1950);
        assert_eq!(clock.output_year_index(), Some(0));
        for _ in 0..12 {
            clock.advance_one_month().unwrap();
        }
        assert_eq!(clock.output_year_index(), Some(1));
    }

    #[test]
    fn without_start_year_every_year_is_output() {
        let mut clock = StageClock::new(None);
        clock.enter_stage(Stage::Spinup, 1001);
        assert_eq!(clock.output_year_index(), Some(0));
    }

    #[test]
    fn days_in_month_sum_to_a_year() {
        assert_eq!(DAYS_IN_MONTH.iter().sum::<u32>(), 365);
        assert_eq!(days_in_month(1), Some(28));
        assert_eq!(days_in_month(12), None);
    }
}
