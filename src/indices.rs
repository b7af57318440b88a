//! Determine which days or months of a NClimGrid file hold real data.
//!
//! Daily files cover a calendar month but are published before the month is complete; the
//! not-yet-observed days are filled with negative sentinel values. Monthly files hold the
//! full record since 1895, one time step per month. In both cases the units are returned
//! newest first so that callers can stop early once they reach data that was already
//! processed.
use std::fmt::Display;

use error_stack::ResultExt;

use crate::constants::Variable;
use crate::hrefs::href_variable;
use crate::netcdf_io::NcDataset;

pub type IndexResult<T> = error_stack::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Expected the precipitation netCDF file, got '{0}'")]
    InvalidVariable(String),
    #[error("Invalid range: {0}")]
    Range(String),
    #[error("Could not read the time steps of {0}")]
    SourceRead(String),
}

/// One temporal unit of a NClimGrid file: a day of the month for daily files, or a time
/// step with its `YYYYMM` label for monthly files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalUnit {
    /// Day of month, 1-based.
    Day(u32),
    /// 1-based position along the time dimension and its `YYYYMM` label.
    Month { index: usize, label: String },
}

impl TemporalUnit {
    /// Zero-based index along the netCDF time dimension.
    ///
    /// Days and month indices are 1-based; passing 0 is a caller bug.
    pub fn time_index(&self) -> usize {
        let one_based = match self {
            TemporalUnit::Day(day) => *day as usize,
            TemporalUnit::Month { index, .. } => *index,
        };
        debug_assert!(one_based >= 1, "{self:?} is not 1-based");
        one_based.saturating_sub(1)
    }
}

impl Display for TemporalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemporalUnit::Day(day) => write!(f, "day {day:02}"),
            TemporalUnit::Month { label, .. } => write!(f, "month {label}"),
        }
    }
}

/// An inclusive range of 1-based days of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub start: u32,
    pub end: u32,
}

/// An inclusive range of months given as `YYYYMM` labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRange {
    pub start: String,
    pub end: String,
}

impl MonthRange {
    pub fn new(start: &str, end: &str) -> IndexResult<Self> {
        for label in [start, end] {
            if label.len() != 6 || !label.chars().all(|c| c.is_ascii_digit()) {
                return Err(IndexError::Range(format!("'{label}' is not a YYYYMM month")).into());
            }
        }
        Ok(Self { start: start.to_string(), end: end.to_string() })
    }
}

fn check_is_prcp(href: &str) -> IndexResult<()> {
    if href_variable(href) == Some(Variable::Prcp) {
        Ok(())
    } else {
        Err(IndexError::InvalidVariable(href.to_string()).into())
    }
}

/// Count the leading time steps of `prcp` whose smallest non-missing value is non-negative.
fn count_valid_days(ds: &NcDataset) -> IndexResult<u32> {
    let href = ds.href().to_string();
    let varname = Variable::Prcp.as_str();
    let (n_times, _, _) = ds.grid_shape(varname)
        .change_context_lazy(|| IndexError::SourceRead(href.clone()))?;

    let mut n_valid = 0;
    for t in 0..n_times {
        let slice = ds.grid_slice(varname, t)
            .change_context_lazy(|| IndexError::SourceRead(href.clone()))?;
        let min = slice.iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f32::min);
        match min {
            Some(m) if m >= 0.0 => n_valid += 1,
            _ => break,
        }
    }
    Ok(n_valid)
}

/// Days with valid data in a daily precipitation file, newest first.
///
/// With a `range`, the requested days are clamped to those available. It is an error for
/// the range to be reversed or to fall entirely outside the available days.
pub fn day_indices(prcp_href: &str, range: Option<DayRange>) -> IndexResult<Vec<TemporalUnit>> {
    check_is_prcp(prcp_href)?;
    let days = {
        let ds = NcDataset::open(prcp_href)
            .change_context_lazy(|| IndexError::SourceRead(prcp_href.to_string()))?;
        count_valid_days(&ds)?
    };
    log::debug!("{prcp_href} has {days} day(s) of valid data");

    let (first, last) = match range {
        None => (1, days),
        Some(DayRange { start, end }) => {
            if start > end {
                return Err(IndexError::Range(format!("start day {start} is after end day {end}")).into());
            }
            let first = start.max(1);
            let last = end.min(days);
            if first > last {
                return Err(IndexError::Range(format!(
                    "days {start} to {end} are outside the {days} available day(s)"
                )).into());
            }
            (first, last)
        }
    };

    Ok((first..=last).rev().map(TemporalUnit::Day).collect())
}

/// Months in a monthly precipitation file, newest first, optionally restricted to `range`.
pub fn month_indices(prcp_href: &str, range: Option<&MonthRange>) -> IndexResult<Vec<TemporalUnit>> {
    check_is_prcp(prcp_href)?;
    let year_months = {
        let ds = NcDataset::open(prcp_href)
            .change_context_lazy(|| IndexError::SourceRead(prcp_href.to_string()))?;
        ds.time_year_months()
            .change_context_lazy(|| IndexError::SourceRead(prcp_href.to_string()))?
    };

    let mut units: Vec<(usize, String)> = year_months.into_iter()
        .enumerate()
        .map(|(i, (year, month))| (i + 1, format!("{year:04}{month:02}")))
        .collect();
    units.sort_by_key(|(index, _)| *index);

    if let Some(range) = range {
        if range.start > range.end {
            return Err(IndexError::Range(format!(
                "start month {} is after end month {}", range.start, range.end
            )).into());
        }
        units.retain(|(_, label)| *label >= range.start && *label <= range.end);
        if units.is_empty() {
            return Err(IndexError::Range(format!(
                "months {} to {} are outside the data in {prcp_href}", range.start, range.end
            )).into());
        }
    }

    log::debug!("{prcp_href} has {} month(s) selected", units.len());
    Ok(units.into_iter()
        .rev()
        .map(|(index, label)| TemporalUnit::Month { index, label })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{path_str, write_daily_nc, write_monthly_nc, GridFixture};

    #[test]
    fn test_day_indices_padded_month() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_daily_nc(tmp.path(), Variable::Prcp, &GridFixture::daily(31, 5));
        let days = day_indices(path_str(&path), None).unwrap();
        let expected: Vec<_> = (1..=5).rev().map(TemporalUnit::Day).collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn test_day_indices_stop_at_first_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fixture = GridFixture::daily(6, 6);
        fixture.values[2] = vec![f32::NAN; 4];
        let path = write_daily_nc(tmp.path(), Variable::Prcp, &fixture);
        let days = day_indices(path_str(&path), None).unwrap();
        assert_eq!(days, vec![TemporalUnit::Day(2), TemporalUnit::Day(1)]);
    }

    #[test]
    fn test_day_indices_ranges() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_daily_nc(tmp.path(), Variable::Prcp, &GridFixture::daily(31, 5));
        let href = path_str(&path);

        let days = day_indices(href, Some(DayRange { start: 3, end: 20 })).unwrap();
        assert_eq!(days, vec![TemporalUnit::Day(5), TemporalUnit::Day(4), TemporalUnit::Day(3)]);

        let e = day_indices(href, Some(DayRange { start: 4, end: 2 })).unwrap_err();
        assert!(matches!(e.current_context(), IndexError::Range(_)));

        let e = day_indices(href, Some(DayRange { start: 10, end: 20 })).unwrap_err();
        assert!(matches!(e.current_context(), IndexError::Range(_)));
    }

    #[test]
    fn test_day_indices_wrong_variable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_daily_nc(tmp.path(), Variable::Tmax, &GridFixture::daily(31, 5));
        let e = day_indices(path_str(&path), None).unwrap_err();
        assert!(matches!(e.current_context(), IndexError::InvalidVariable(_)));
    }

    #[test]
    fn test_month_indices() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_monthly_nc(tmp.path(), Variable::Prcp, &GridFixture::monthly());
        let months = month_indices(path_str(&path), None).unwrap();
        assert_eq!(months, vec![
            TemporalUnit::Month { index: 2, label: "189502".to_string() },
            TemporalUnit::Month { index: 1, label: "189501".to_string() },
        ]);
        assert_eq!(months[0].time_index(), 1);
    }

    #[test]
    fn test_month_indices_ranges() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_monthly_nc(tmp.path(), Variable::Prcp, &GridFixture::monthly());
        let href = path_str(&path);

        let range = MonthRange::new("189502", "190012").unwrap();
        let months = month_indices(href, Some(&range)).unwrap();
        assert_eq!(months, vec![TemporalUnit::Month { index: 2, label: "189502".to_string() }]);

        let range = MonthRange::new("189503", "189501").unwrap();
        let e = month_indices(href, Some(&range)).unwrap_err();
        assert!(matches!(e.current_context(), IndexError::Range(_)));

        let range = MonthRange::new("200001", "200012").unwrap();
        let e = month_indices(href, Some(&range)).unwrap_err();
        assert!(matches!(e.current_context(), IndexError::Range(_)));

        assert!(MonthRange::new("1895-01", "189502").is_err());
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let e = month_indices("/not/a/real/dir/nclimgrid_prcp.nc", None).unwrap_err();
        assert!(matches!(e.current_context(), IndexError::SourceRead(_)));
    }

    #[test]
    fn test_time_index() {
        assert_eq!(TemporalUnit::Day(1).time_index(), 0);
        assert_eq!(TemporalUnit::Day(31).time_index(), 30);
        assert_eq!(TemporalUnit::Month { index: 2, label: "189502".to_string() }.time_index(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "is not 1-based")]
    fn test_day_zero_time_index() {
        TemporalUnit::Day(0).time_index();
    }
}
