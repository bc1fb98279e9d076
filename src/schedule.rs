//! Fire specifications: when a job's trigger fires.
//!
//! A [`FireSpec`] is the recurrence actually installed in the trigger table,
//! as opposed to the free-form cadence text carried on the job record. The
//! scheduler's fire-spec policy maps one onto the other; see
//! [`FireSpec::from_cadence`] for the default mapping.

use std::str::FromStr;

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};

/// The recurrence backing one trigger.
#[derive(Debug, Clone)]
pub enum FireSpec {
    /// Once per day at the given UTC time of day.
    Daily { at: NaiveTime },
    /// Every fixed interval, measured from the end of the previous occurrence.
    Every { period: TimeDelta },
    /// A full cron expression, seconds granularity.
    Cron { schedule: cron::Schedule },
}

impl FireSpec {
    /// Lead applied ahead of "now" when a job's declared cadence cannot be
    /// interpreted: the job then fires daily, starting two minutes from
    /// creation time.
    pub const DEFAULT_LEAD: TimeDelta = TimeDelta::minutes(2);

    pub fn daily(at: NaiveTime) -> Self {
        Self::Daily { at }
    }

    /// A fixed-interval recurrence. Periods shorter than a millisecond are
    /// clamped up so a trigger task can never spin.
    pub fn every(period: TimeDelta) -> Self {
        Self::Every {
            period: period.max(TimeDelta::milliseconds(1)),
        }
    }

    pub fn cron(expr: &str) -> Result<Self, cron::error::Error> {
        Ok(Self::Cron {
            schedule: cron::Schedule::from_str(expr)?,
        })
    }

    /// The daily schedule derived from the current time plus
    /// [`Self::DEFAULT_LEAD`].
    ///
    /// The lead is applied to the full timestamp before the time of day is
    /// extracted, so a lead crossing a minute, hour, or day boundary rolls
    /// over correctly.
    pub fn with_default_lead(now: DateTime<Utc>) -> Self {
        let at = (now + Self::DEFAULT_LEAD).time();
        let at = NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).unwrap_or(at);
        Self::Daily { at }
    }

    /// Interprets a job's declared cadence.
    ///
    /// `"HH:MM"` becomes a daily schedule at that UTC time and anything
    /// parsing as a cron expression is honoured as-is; any other value falls
    /// back to [`Self::with_default_lead`].
    pub fn from_cadence(cadence: &str, now: DateTime<Utc>) -> Self {
        let cadence = cadence.trim();
        if let Ok(at) = NaiveTime::parse_from_str(cadence, "%H:%M") {
            return Self::Daily { at };
        }
        if let Ok(schedule) = cron::Schedule::from_str(cadence) {
            return Self::Cron { schedule };
        }
        Self::with_default_lead(now)
    }

    /// The next occurrence strictly after the given instant.
    ///
    /// An exhausted cron schedule yields the far future, i.e. a trigger that
    /// sleeps until it is cancelled.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily { at } => {
                let candidate = after.date_naive().and_time(*at).and_utc();
                if candidate > after {
                    candidate
                } else {
                    candidate + TimeDelta::days(1)
                }
            }
            Self::Every { period } => after + *period,
            Self::Cron { schedule } => schedule
                .after(&after)
                .next()
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}
