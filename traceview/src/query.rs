//! Range query planning and query-boundary parameter parsing.
//!
//! [`ScanPlan`] turns the optional bounds of a range query into a concrete
//! scan: which direction to walk the time index, between which instants,
//! and how many records at most. [`TraceQuery`] parses the raw `from`, `to`,
//! `count` and `exclusive` strings a client sends.

use chrono::{DateTime, Utc};

use crate::error::{QueryError, Result};

/// Maximum number of records a range query ever returns.
pub const HARD_CAP: usize = 100;

/// Record count used when a client does not ask for one.
pub const DEFAULT_COUNT: usize = 100;

/// Direction in which the time index is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending from the lower bound.
    Forward,
    /// Descending from the upper bound. Results are reversed before they
    /// are returned so callers always see ascending order.
    Reverse,
}

/// A fully resolved range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPlan {
    /// Lower bound (inclusive unless `exclusive`).
    pub from: DateTime<Utc>,
    /// Upper bound (inclusive unless `exclusive`).
    pub to: DateTime<Utc>,
    /// Walk direction.
    pub direction: ScanDirection,
    /// Drop records whose timestamp equals either bound.
    pub exclusive: bool,
    /// Record limit, already clamped to [`HARD_CAP`].
    pub limit: usize,
}

impl ScanPlan {
    /// Resolves optional bounds into a plan.
    ///
    /// - `from` and `to`: forward scan between them.
    /// - only `to`: reverse scan down from `to`, unbounded below.
    /// - only `from`: forward scan from `from` up to `now`.
    /// - neither: forward scan from the Unix epoch up to `now`.
    ///
    /// Each absent bound is defaulted on its own; supplying one never
    /// changes the other.
    pub fn resolve(
        limit: usize,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        exclusive: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let limit = limit.min(HARD_CAP);
        match (from, to) {
            (None, Some(to)) => Self {
                from: DateTime::<Utc>::MIN_UTC,
                to,
                direction: ScanDirection::Reverse,
                exclusive,
                limit,
            },
            (from, to) => Self {
                from: from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                to: to.unwrap_or(now),
                direction: ScanDirection::Forward,
                exclusive,
                limit,
            },
        }
    }

    /// Whether a timestamp inside the bounds survives the exclusivity rule.
    ///
    /// A reverse scan has no caller-supplied lower bound, so only `to` is
    /// excluded.
    pub fn admits(&self, timestamp: DateTime<Utc>) -> bool {
        if !self.exclusive {
            return true;
        }
        timestamp != self.to
            && (self.direction == ScanDirection::Reverse || timestamp != self.from)
    }

    /// True if the bounds cannot contain any record.
    pub fn is_empty_range(&self) -> bool {
        self.from > self.to || self.limit == 0
    }
}

/// Parsed query-boundary parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceQuery {
    /// Lower bound, if supplied.
    pub from: Option<DateTime<Utc>>,
    /// Upper bound. Defaults to now when not supplied.
    pub to: Option<DateTime<Utc>>,
    /// Record count, clamped to [`HARD_CAP`].
    pub count: usize,
    /// Exclude records exactly on a bound.
    pub exclusive: bool,
}

impl TraceQuery {
    /// Parses raw parameter values. Blank values count as absent.
    ///
    /// Because `to` defaults to `now`, a query with no `from` is served by a
    /// reverse scan and yields the most recent records.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidTimestamp`] if a bound is not RFC 3339
    /// and [`QueryError::InvalidCount`] if `count` is not a positive integer.
    pub fn from_params(
        from: Option<&str>,
        to: Option<&str>,
        count: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let from = non_blank(from)
            .map(|v| parse_bound("from", v))
            .transpose()?;
        let to = match non_blank(to) {
            Some(v) => parse_bound("to", v)?,
            None => now,
        };
        let count = match non_blank(count) {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => n.min(HARD_CAP),
                _ => {
                    return Err(QueryError::InvalidCount {
                        value: v.to_string(),
                    }
                    .into());
                }
            },
            None => DEFAULT_COUNT,
        };

        Ok(Self {
            from,
            to: Some(to),
            count,
            exclusive: false,
        })
    }

    /// Sets the exclusivity flag from a raw `true`/`false` value.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidFlag`] for anything other than `true`,
    /// `false` or a blank value.
    pub fn with_exclusive_param(mut self, exclusive: Option<&str>) -> Result<Self> {
        self.exclusive = match non_blank(exclusive) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(QueryError::InvalidFlag {
                    param: "exclusive",
                    value: other.to_string(),
                }
                .into());
            }
        };
        Ok(self)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bound(param: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            QueryError::InvalidTimestamp {
                param,
                value: value.to_string(),
            }
            .into()
        })
}
