//! Due-date arithmetic.
//!
//! Business-hours mode only spends budget Monday to Friday inside the
//! configured window; weekends and off-hours are skipped at zero cost.
//! All times are UTC.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{CalendarMode, Priority, SlaPlan, Ticket};
use crate::store::TicketStore;

/// Daily business window, `[open, close)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessCalendar {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl BusinessCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self> {
        if open >= close {
            return Err(Error::Config(format!(
                "business hours must open before they close (got {open}-{close})"
            )));
        }
        Ok(Self { open, close })
    }

    /// Parse `HH:MM-HH:MM`.
    pub fn parse(window: &str) -> Result<Self> {
        let (open, close) = window
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("bad business hours window: {window}")))?;
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| Error::Config(format!("bad business hours time {s:?}: {e}")))
        };
        Self::new(parse(open)?, parse(close)?)
    }

    fn opening(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.open).and_utc()
    }

    fn closing(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.close).and_utc()
    }

    /// Walk forward from `start`, spending `budget` only inside business hours.
    ///
    /// Whole business weeks are skipped in one step, then each iteration
    /// either rolls to the next opening (free) or spends a positive slice of
    /// the remainder, so the walk is bounded by about a week of days.
    /// `None` when the result falls outside the representable range.
    pub fn add_business_time(
        &self,
        start: DateTime<Utc>,
        budget: Duration,
    ) -> Option<DateTime<Utc>> {
        let week = (self.close - self.open).num_seconds() * 5;
        if week <= 0 {
            return None;
        }
        let mut current = start;
        let mut remaining = budget;

        loop {
            let date = current.date_naive();

            if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                let to_monday = 8 - u64::from(current.weekday().number_from_monday());
                current = self.opening(date.checked_add_days(Days::new(to_monday))?);
                continue;
            }
            if current.time() < self.open {
                current = self.opening(date);
                continue;
            }
            if current.time() >= self.close {
                current = self.opening(date.checked_add_days(Days::new(1))?);
                continue;
            }

            // Seven calendar days from an in-hours weekday instant hold
            // exactly one business week. Keep a positive remainder.
            let weeks = (remaining.num_seconds() - 1) / week;
            if weeks > 0 {
                let days = u64::try_from(weeks).ok()?.checked_mul(7)?;
                current = current.checked_add_days(Days::new(days))?;
                remaining = remaining.checked_sub(&Duration::try_seconds(weeks * week)?)?;
            }

            let date = current.date_naive();
            let available = self.closing(date) - current;
            if remaining <= available {
                return current.checked_add_signed(remaining);
            }
            remaining -= available;
            current = self.opening(date.checked_add_days(Days::new(1))?);
        }
    }
}

/// Computes due dates from SLA plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaClock {
    calendar: BusinessCalendar,
}

impl SlaClock {
    pub fn new(calendar: BusinessCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Due timestamp for `plan` starting at `start`. `None` when the plan
    /// has no positive budget or the due date would overflow.
    pub fn compute_due_date(&self, plan: &SlaPlan, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let budget = Duration::try_minutes(plan.target_minutes()?)?;
        match plan.calendar {
            CalendarMode::TwentyFourSeven => start.checked_add_signed(budget),
            CalendarMode::BusinessHours => self.calendar.add_business_time(start, budget),
        }
    }

    /// Bind `plan` to the ticket and recompute its due date from creation time.
    pub fn apply_plan(&self, ticket: &mut Ticket, plan: Option<&SlaPlan>, explicit: bool) {
        ticket.sla_plan = plan.map(|p| p.id);
        ticket.sla_plan_explicit = explicit && plan.is_some();
        ticket.due_at = plan.and_then(|p| self.compute_due_date(p, ticket.created_at));
    }

    /// Re-resolve the priority-derived plan of a ticket. Tickets pinned to
    /// an explicit plan are left alone.
    pub async fn rederive_default_plan(
        &self,
        store: &dyn TicketStore,
        ticket: &mut Ticket,
    ) -> Result<()> {
        if ticket.sla_plan_explicit {
            return Ok(());
        }
        let priority = ticket.priority;
        let plans = store.active_plans(ticket.tenant_id).await?;
        self.apply_plan(ticket, resolve_default_plan(&plans, priority), false);
        Ok(())
    }
}

/// Pick the default plan for a priority.
///
/// Prefers active plans whose name carries the priority keyword, then any
/// active plan; ties go to the lowest response time.
pub fn resolve_default_plan(plans: &[SlaPlan], priority: Priority) -> Option<&SlaPlan> {
    let keyword = priority.plan_keyword();
    plans
        .iter()
        .filter(|p| p.active && p.name.contains(keyword))
        .min_by_key(|p| p.response_time_minutes)
        .or_else(|| {
            plans
                .iter()
                .filter(|p| p.active)
                .min_by_key(|p| p.response_time_minutes)
        })
}
