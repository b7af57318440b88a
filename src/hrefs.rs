//! Working with HREFs to NClimGrid files.
//!
//! An HREF is either a local path or a URL (anything with a `scheme://` prefix). The four
//! variables of a NClimGrid product are stored in sibling files that differ only by the
//! variable token in the file name:
//!
//! - daily files look like `prcp-202201-grd-prelim.nc`, with the variable first, and
//! - monthly files look like `nclimgrid_prcp.nc`, with the variable after a fixed prefix.
//!
//! The functions here classify such names and derive the sibling HREFs.
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use error_stack::ResultExt;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::constants::{Frequency, Variable, VariableMap};

pub type HrefResult<T> = error_stack::Result<T, HrefError>;

/// Prefix of monthly netCDF and COG file names
pub const MONTHLY_PREFIX: &str = "nclimgrid";

static DAILY_NC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(prcp|tavg|tmax|tmin)-\d{6}").expect("daily netCDF regex is valid"));
static MONTHLY_NC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^nclimgrid_(prcp|tavg|tmax|tmin)(?:[._]|$)").expect("monthly netCDF regex is valid"));
static DAILY_COG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(prcp|tavg|tmax|tmin)-(\d{4})(\d{2}).*-(\d{2})$").expect("daily COG regex is valid")
});
static MONTHLY_COG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^nclimgrid-(prcp|tavg|tmax|tmin)-(\d{4})(\d{2})$").expect("monthly COG regex is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum HrefError {
    #[error("The file name of '{0}' does not match any known NClimGrid naming convention")]
    UnrecognizedFilenameFormat(String),
    #[error("The file name of '{href}' contains an invalid date: {reason}")]
    InvalidDate { href: String, reason: String },
    #[error("Could not determine the current directory to make '{0}' absolute")]
    CurrentDir(String),
}

/// Parse `href` as a URL if it has a scheme. Single-letter schemes are Windows drive
/// letters, so those HREFs are local paths.
pub fn remote_url(href: &str) -> Option<Url> {
    Url::parse(href).ok().filter(|url| url.scheme().len() > 1 && !url.cannot_be_a_base())
}

/// Returns `true` if `href` points to a remote resource (i.e. has a URL scheme).
pub fn is_remote(href: &str) -> bool {
    remote_url(href).is_some()
}

/// The last path component of an HREF. For URLs, any query string or fragment is dropped.
pub fn href_basename(href: &str) -> String {
    match remote_url(href) {
        Some(url) => url.path_segments()
            .and_then(|segments| segments.last())
            .unwrap_or_default()
            .to_string(),
        None => Path::new(href)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
    }
}

/// The basename of an HREF with its extension removed.
pub fn href_stem(href: &str) -> String {
    let base = href_basename(href);
    let stem = Path::new(&base).file_stem().map(|s| s.to_string_lossy().to_string());
    stem.unwrap_or(base)
}

/// The HREF of the file `name` in the same directory (or under the same URL prefix) as
/// `href`. A URL's query string and fragment are not carried over.
pub fn sibling_href(href: &str, name: &str) -> String {
    match remote_url(href) {
        Some(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop().push(name);
            }
            url.to_string()
        }
        None => Path::new(href).with_file_name(name).to_string_lossy().to_string(),
    }
}

/// Join a file name onto a directory HREF, respecting whether the directory is a URL or a path.
pub fn join_href(dir: &str, name: &str) -> String {
    match remote_url(dir) {
        Some(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(name);
            }
            url.to_string()
        }
        None => Path::new(dir).join(name).to_string_lossy().to_string(),
    }
}

/// Determine whether the passed HREF (netCDF or COG) refers to daily or monthly data.
///
/// Monthly files are named with a leading "nclimgrid"; anything else is considered daily.
pub fn data_frequency(href: &str) -> Frequency {
    if href_stem(href).starts_with(MONTHLY_PREFIX) {
        Frequency::Monthly
    } else {
        Frequency::Daily
    }
}

/// Given an HREF to one variable's netCDF file, derive the HREFs of all four variables.
///
/// The returned HREFs share the input's directory (or URL prefix) and differ only in
/// the variable token of the file name.
///
/// # Errors
/// Returns [`HrefError::UnrecognizedFilenameFormat`] if the file name follows neither the
/// daily (`VAR-YYYYMM-...`) nor the monthly (`nclimgrid_VAR...`) naming convention.
pub fn nc_href_dict(nc_href: &str) -> HrefResult<VariableMap<String>> {
    let filename = href_basename(nc_href);

    let filenames = match data_frequency(nc_href) {
        Frequency::Daily => {
            if !DAILY_NC_RE.is_match(&filename) {
                return Err(HrefError::UnrecognizedFilenameFormat(nc_href.to_string()).into());
            }
            let suffix = &filename[4..];
            VariableMap::from_fn(|var| format!("{var}{suffix}"))
        }
        Frequency::Monthly => {
            if !MONTHLY_NC_RE.is_match(&filename) {
                return Err(HrefError::UnrecognizedFilenameFormat(nc_href.to_string()).into());
            }
            let suffix = &filename[14..];
            VariableMap::from_fn(|var| format!("nclimgrid_{var}{suffix}"))
        }
    };

    log::debug!("Resolved sibling netCDF files for {nc_href}: {filenames:?}");
    Ok(filenames.map(|_, f| sibling_href(nc_href, f)))
}

/// Returns the variable a netCDF or COG HREF refers to, if its name follows a known convention.
pub fn href_variable(href: &str) -> Option<Variable> {
    let stem = href_stem(href);
    let caps = DAILY_NC_RE.captures(&stem)
        .or_else(|| MONTHLY_NC_RE.captures(&stem))
        .or_else(|| DAILY_COG_RE.captures(&stem))
        .or_else(|| MONTHLY_COG_RE.captures(&stem))?;
    caps.get(1).and_then(|m| m.as_str().parse().ok())
}

/// The temporal unit a COG file covers, as parsed from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CogPeriod {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

/// Parse the day or month a COG covers from its file name.
///
/// Daily COGs are named `<netCDF basename>-DD.tif`, e.g. `prcp-202201-grd-prelim-01.tif`,
/// and monthly COGs `nclimgrid-<var>-YYYYMM.tif`.
pub fn cog_period(cog_href: &str) -> HrefResult<CogPeriod> {
    let stem = href_stem(cog_href);
    let bad_date = |reason: String| HrefError::InvalidDate { href: cog_href.to_string(), reason };

    if let Some(caps) = MONTHLY_COG_RE.captures(&stem) {
        let year: i32 = caps[2].parse().map_err(|e| bad_date(format!("{e}")))?;
        let month: u32 = caps[3].parse().map_err(|e| bad_date(format!("{e}")))?;
        if !(1..=12).contains(&month) {
            return Err(bad_date(format!("month {month} is out of range")).into());
        }
        Ok(CogPeriod::Month { year, month })
    } else if let Some(caps) = DAILY_COG_RE.captures(&stem) {
        let year: i32 = caps[2].parse().map_err(|e| bad_date(format!("{e}")))?;
        let month: u32 = caps[3].parse().map_err(|e| bad_date(format!("{e}")))?;
        let day: u32 = caps[4].parse().map_err(|e| bad_date(format!("{e}")))?;
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| bad_date(format!("{year:04}-{month:02}-{day:02} is not a valid date")))?;
        Ok(CogPeriod::Day(date))
    } else {
        Err(HrefError::UnrecognizedFilenameFormat(cog_href.to_string()).into())
    }
}

/// If `href` is a relative local path, make it absolute relative to the current directory.
/// URLs and absolute paths are returned unchanged, apart from `.` and `..` being resolved.
pub fn make_absolute_href(href: &str) -> HrefResult<String> {
    if is_remote(href) {
        return Ok(href.to_string());
    }
    let path = absolute_path(Path::new(href))
        .change_context_lazy(|| HrefError::CurrentDir(href.to_string()))?;
    Ok(path.to_string_lossy().to_string())
}

/// Express `target` relative to the directory `start_dir`, prefixed with `./` when it is
/// below that directory. Relative paths are taken from the current directory. If either
/// is a URL, `target` is returned as-is.
pub fn make_relative_href(target: &str, start_dir: &str) -> String {
    if is_remote(target) || is_remote(start_dir) {
        return target.to_string();
    }
    let (Ok(target_path), Ok(start_path)) = (absolute_path(Path::new(target)), absolute_path(Path::new(start_dir))) else {
        return target.to_string();
    };

    match pathdiff::diff_paths(&target_path, &start_path) {
        Some(rel) if rel.starts_with("..") => rel.to_string_lossy().to_string(),
        Some(rel) => Path::new(".").join(rel).to_string_lossy().to_string(),
        None => target.to_string(),
    }
}

/// Absolute form of `p` with `.` and `..` resolved lexically (symlinks are not followed).
fn absolute_path(p: &Path) -> std::io::Result<PathBuf> {
    let mut out = PathBuf::new();
    for comp in std::path::absolute(p)?.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
