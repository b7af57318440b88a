//! Scoped access to NClimGrid netCDF files.
//!
//! Only the layout NClimGrid uses is supported: data variables with dimensions
//! `(time, lat, lon)` and 1-D `time`, `lat`, and `lon` coordinate variables. The underlying
//! file handle is closed when the [`NcDataset`] is dropped, so callers should keep the
//! dataset in as small a scope as possible, especially for remote (byte-range) files.
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use ndarray::Array2;
use netcdf::AttributeValue;

use crate::hrefs::remote_url;

pub type NcResult<T> = error_stack::Result<T, NcError>;

pub const TIME_DIM_NAME: &str = "time";
pub const LAT_VAR_NAME: &str = "lat";

#[derive(Debug, thiserror::Error)]
pub enum NcError {
    #[error("Could not open netCDF dataset {0}")]
    Open(String),
    #[error("netCDF dataset {href} has no variable '{varname}'")]
    MissingVariable { href: String, varname: String },
    #[error("Variable '{varname}' in {href} is missing the '{attr}' attribute")]
    MissingAttribute { href: String, varname: String, attr: String },
    #[error("netCDF dataset {href} has no global attribute '{attr}'")]
    MissingGlobalAttribute { href: String, attr: String },
    #[error("Could not read variable '{varname}' from {href}")]
    Read { href: String, varname: String },
    #[error("Variable '{varname}' in {href} has an unexpected shape: {reason}")]
    UnexpectedShape { href: String, varname: String, reason: String },
    #[error("Time index {index} is out of range for variable '{varname}' with {n_times} time steps")]
    TimeIndexOutOfRange { varname: String, index: usize, n_times: usize },
    #[error("Could not decode time units '{0}'")]
    BadTimeUnits(String),
    #[error("Calendar '{0}' is not supported, only standard/gregorian calendars are")]
    UnsupportedCalendar(String),
    #[error("Could not interpret attribute '{attr}' as {expected}")]
    BadAttribute { attr: String, expected: &'static str },
}

/// The path or URL handed to libnetcdf: remote HREFs get the `#mode=bytes` fragment unless
/// they already carry a fragment.
fn netcdf_open_target(href: &str) -> String {
    match remote_url(href) {
        Some(mut url) if url.fragment().is_none() => {
            url.set_fragment(Some("mode=bytes"));
            url.to_string()
        }
        _ => href.to_string(),
    }
}

/// An open NClimGrid netCDF file.
pub struct NcDataset {
    href: String,
    file: netcdf::File,
}

impl NcDataset {
    /// Open a local or remote netCDF file.
    ///
    /// HTTP(S) HREFs are opened with libnetcdf's byte-range mode, so only the parts of the
    /// file actually read are fetched. Those requests are made by libnetcdf's own curl
    /// handle, so `http_timeout_secs` does not apply to them; set `HTTP.TIMEOUT` in the
    /// user's `.ncrc` to bound them.
    pub fn open(href: &str) -> NcResult<Self> {
        let open_target = netcdf_open_target(href);
        log::debug!("Opening netCDF dataset {href}");

        let file = netcdf::open(&open_target)
            .map_err(|e| error_stack::Report::new(NcError::Open(href.to_string())).attach_printable(e.to_string()))?;
        Ok(Self { href: href.to_string(), file })
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    fn variable(&self, varname: &str) -> NcResult<netcdf::Variable<'_>> {
        self.file.variable(varname)
            .ok_or_else(|| NcError::MissingVariable { href: self.href.clone(), varname: varname.to_string() }.into())
    }

    /// Shape of a `(time, lat, lon)` data variable as `(n_times, n_lat, n_lon)`.
    pub fn grid_shape(&self, varname: &str) -> NcResult<(usize, usize, usize)> {
        let var = self.variable(varname)?;
        let dims = var.dimensions();
        if dims.len() != 3 {
            return Err(NcError::UnexpectedShape {
                href: self.href.clone(),
                varname: varname.to_string(),
                reason: format!("expected 3 dimensions (time, lat, lon), found {}", dims.len()),
            }.into());
        }
        if dims[0].name() != TIME_DIM_NAME {
            return Err(NcError::UnexpectedShape {
                href: self.href.clone(),
                varname: varname.to_string(),
                reason: format!("expected the first dimension to be '{TIME_DIM_NAME}', found '{}'", dims[0].name()),
            }.into());
        }
        Ok((dims[0].len(), dims[1].len(), dims[2].len()))
    }

    /// Read one time step of a data variable as a 2-D `(lat, lon)` grid.
    ///
    /// Values equal to the variable's `_FillValue` or `missing_value` become `NaN`, and
    /// `scale_factor`/`add_offset` are applied if the variable defines them.
    pub fn grid_slice(&self, varname: &str, time_index: usize) -> NcResult<Array2<f32>> {
        let (n_times, n_lat, n_lon) = self.grid_shape(varname)?;
        if time_index >= n_times {
            return Err(NcError::TimeIndexOutOfRange { varname: varname.to_string(), index: time_index, n_times }.into());
        }

        let var = self.variable(varname)?;
        let raw: Vec<f32> = var.get_values::<f32, _>((time_index, .., ..))
            .map_err(|e| error_stack::Report::new(self.read_error(varname)).attach_printable(e.to_string()))?;

        let fill_values: Vec<f32> = ["_FillValue", "missing_value"]
            .into_iter()
            .filter_map(|attr| numeric_attribute(&var, attr))
            .map(|v| v as f32)
            .collect();
        let scale = numeric_attribute(&var, "scale_factor").unwrap_or(1.0) as f32;
        let offset = numeric_attribute(&var, "add_offset").unwrap_or(0.0) as f32;

        let values = raw.into_iter()
            .map(|v| {
                if v.is_nan() || fill_values.iter().any(|f| *f == v) {
                    f32::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect::<Vec<_>>();

        Array2::from_shape_vec((n_lat, n_lon), values)
            .map_err(|e| error_stack::Report::new(NcError::UnexpectedShape {
                href: self.href.clone(),
                varname: varname.to_string(),
                reason: e.to_string(),
            }))
    }

    /// The latitude coordinate values, in file order.
    pub fn latitudes(&self) -> NcResult<Vec<f64>> {
        let var = self.variable(LAT_VAR_NAME)?;
        var.get_values::<f64, _>(..)
            .map_err(|e| error_stack::Report::new(self.read_error(LAT_VAR_NAME)).attach_printable(e.to_string()))
    }

    /// Decode the time coordinate into (year, month) pairs, one per time step.
    pub fn time_year_months(&self) -> NcResult<Vec<(i32, u32)>> {
        let var = self.variable(TIME_DIM_NAME)?;
        let units = string_attribute(&var, "units")
            .ok_or_else(|| NcError::MissingAttribute {
                href: self.href.clone(),
                varname: TIME_DIM_NAME.to_string(),
                attr: "units".to_string(),
            })?;
        if let Some(calendar) = string_attribute(&var, "calendar") {
            check_calendar(&calendar)?;
        }

        let values = var.get_values::<f64, _>(..)
            .map_err(|e| error_stack::Report::new(self.read_error(TIME_DIM_NAME)).attach_printable(e.to_string()))?;
        let times = decode_cf_times(&values, &units)?;
        Ok(times.into_iter().map(|t| (t.year(), t.month())).collect())
    }

    /// The raw value of the global `date_created` attribute.
    pub fn date_created(&self) -> NcResult<String> {
        let missing = || NcError::MissingGlobalAttribute { href: self.href.clone(), attr: "date_created".to_string() };
        let attr = self.file.attribute("date_created").ok_or_else(missing)?;
        let value = attr.value()
            .map_err(|e| error_stack::Report::new(missing()).attach_printable(e.to_string()))?;
        match value {
            AttributeValue::Str(s) => Ok(s),
            AttributeValue::Strs(v) if !v.is_empty() => Ok(v.join(" ")),
            _ => Err(NcError::BadAttribute { attr: "date_created".to_string(), expected: "a string" }.into()),
        }
    }

    fn read_error(&self, varname: &str) -> NcError {
        NcError::Read { href: self.href.clone(), varname: varname.to_string() }
    }
}

fn numeric_attribute(var: &netcdf::Variable, attr: &str) -> Option<f64> {
    let value = var.attribute_value(attr)?.ok()?;
    match value {
        AttributeValue::Uchar(v) => Some(v as f64),
        AttributeValue::Schar(v) => Some(v as f64),
        AttributeValue::Ushort(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Uint(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        _ => None,
    }
}

fn string_attribute(var: &netcdf::Variable, attr: &str) -> Option<String> {
    match var.attribute_value(attr)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn check_calendar(calendar: &str) -> Result<(), NcError> {
    match calendar.to_ascii_lowercase().as_str() {
        "standard" | "gregorian" | "proleptic_gregorian" => Ok(()),
        _ => Err(NcError::UnsupportedCalendar(calendar.to_string())),
    }
}

/// Convert numeric CF time values to datetimes given a units string such as
/// "days since 1800-01-01 00:00:00".
pub fn decode_cf_times(values: &[f64], units: &str) -> NcResult<Vec<NaiveDateTime>> {
    let bad_units = || NcError::BadTimeUnits(units.to_string());
    let (step, reference) = units.split_once(" since ").ok_or_else(bad_units)?;

    let millis_per_step: f64 = match step.trim().to_ascii_lowercase().as_str() {
        "days" | "day" | "d" => 86_400_000.0,
        "hours" | "hour" | "h" => 3_600_000.0,
        "minutes" | "minute" | "min" => 60_000.0,
        "seconds" | "second" | "s" => 1_000.0,
        _ => return Err(bad_units().into()),
    };
    let reference = parse_reference_time(reference.trim()).ok_or_else(bad_units)?;

    values.iter()
        .map(|v| {
            if !v.is_finite() {
                return Err(error_stack::Report::new(bad_units())
                    .attach_printable(format!("time value {v} is not finite")));
            }
            let offset = chrono::Duration::milliseconds((v * millis_per_step).round() as i64);
            reference.checked_add_signed(offset)
                .ok_or_else(|| error_stack::Report::new(bad_units())
                    .attach_printable(format!("time value {v} overflows")))
        })
        .collect()
}

fn parse_reference_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim_end_matches(" UTC").trim_end_matches('Z');
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse the loosely-formatted `date_created` attribute into a UTC datetime.
///
/// Timestamps without an offset are taken to be UTC.
pub fn parse_date_created(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    parse_reference_time(s).map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_monthly_nc, GridFixture};

    #[test]
    fn test_decode_cf_days() {
        let times = decode_cf_times(&[0.0, 31.0, 59.0], "days since 1895-01-01").unwrap();
        let ym: Vec<_> = times.iter().map(|t| (t.year(), t.month())).collect();
        assert_eq!(ym, vec![(1895, 1), (1895, 2), (1895, 3)]);

        let times = decode_cf_times(&[24.0], "hours since 2000-01-31 00:00:00").unwrap();
        assert_eq!(times[0], NaiveDate::from_ymd_opt(2000, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_decode_cf_bad_units() {
        let e = decode_cf_times(&[0.0], "fortnights since 1900-01-01").unwrap_err();
        assert!(matches!(e.current_context(), NcError::BadTimeUnits(_)));
        assert!(decode_cf_times(&[0.0], "days after 1900-01-01").is_err());
    }

    #[test]
    fn test_parse_date_created() {
        let expected = Utc.with_ymd_and_hms(2022, 2, 4, 15, 29, 22).unwrap();
        assert_eq!(parse_date_created("2022-02-04T15:29:22Z"), Some(expected));
        assert_eq!(parse_date_created("2022-02-04 15:29:22"), Some(expected));
        assert_eq!(parse_date_created("2022-02-04T10:29:22-05:00"), Some(expected));
        assert_eq!(parse_date_created("sometime last week"), None);
    }

    #[test]
    fn test_read_slice_masks_fill() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = GridFixture::monthly();
        let path = write_monthly_nc(tmp.path(), crate::constants::Variable::Prcp, &fixture);
        let ds = NcDataset::open(path.to_str().unwrap()).unwrap();

        assert_eq!(ds.grid_shape("prcp").unwrap(), (2, 2, 2));
        let slice = ds.grid_slice("prcp", 1).unwrap();
        assert_eq!(slice.dim(), (2, 2));
        assert!(slice[[0, 1]].is_nan());
        assert_eq!(slice[[1, 0]], fixture.values[1][2]);

        assert_eq!(ds.time_year_months().unwrap(), vec![(1895, 1), (1895, 2)]);
        assert_eq!(ds.date_created().unwrap(), fixture.date_created);

        let e = ds.grid_slice("prcp", 2).unwrap_err();
        assert!(matches!(e.current_context(), NcError::TimeIndexOutOfRange { .. }));
        let e = ds.grid_slice("snow", 0).unwrap_err();
        assert!(matches!(e.current_context(), NcError::MissingVariable { .. }));
    }

    #[test]
    fn test_open_missing_file() {
        let e = NcDataset::open("/definitely/not/here/nclimgrid_prcp.nc").err().unwrap();
        assert!(matches!(e.current_context(), NcError::Open(_)));
    }

    #[test]
    fn test_netcdf_open_target() {
        assert_eq!(
            netcdf_open_target("https://host/nclimgrid_prcp.nc?sig=abc"),
            "https://host/nclimgrid_prcp.nc?sig=abc#mode=bytes"
        );
        assert_eq!(netcdf_open_target("https://host/a.nc#mode=bytes,cache"), "https://host/a.nc#mode=bytes,cache");
        assert_eq!(netcdf_open_target("/data/nclimgrid_prcp.nc"), "/data/nclimgrid_prcp.nc");
    }
}
