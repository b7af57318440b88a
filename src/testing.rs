//! Small synthetic NClimGrid-like netCDF files for tests.
use std::path::{Path, PathBuf};

use crate::constants::{Variable, VariableMap};

pub(crate) const FILL_VALUE: f32 = -999.0;

/// Description of a tiny `(time, lat, lon)` grid to write to a netCDF file.
pub(crate) struct GridFixture {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub times: Vec<f64>,
    pub time_units: String,
    /// One row-major `(lat, lon)` slice per time step.
    pub values: Vec<Vec<f32>>,
    pub date_created: String,
}

impl GridFixture {
    /// Two months (January and February 1895) on a 2x2 grid with ascending latitude.
    /// Element `[0, 1]` of the second month is the fill value.
    pub fn monthly() -> Self {
        Self {
            lats: vec![24.5, 49.0],
            lons: vec![-124.0, -67.0],
            times: vec![0.0, 31.0],
            time_units: "days since 1895-01-01".to_string(),
            values: vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, FILL_VALUE, 7.0, 8.0]],
            date_created: "2022-02-04T15:29:22Z".to_string(),
        }
    }

    /// A padded daily file for January 2022: `n_valid` days of real data followed by
    /// negative sentinel values up to `n_slots` time steps.
    pub fn daily(n_slots: usize, n_valid: usize) -> Self {
        let values = (0..n_slots)
            .map(|t| {
                if t < n_valid {
                    vec![0.0, 1.5 + t as f32, FILL_VALUE, 3.0]
                } else {
                    vec![-99.0; 4]
                }
            })
            .collect();
        Self {
            lats: vec![24.5, 49.0],
            lons: vec![-124.0, -67.0],
            times: (0..n_slots).map(|t| t as f64).collect(),
            time_units: "days since 2022-01-01".to_string(),
            values,
            date_created: "2022-02-04 15:29:22".to_string(),
        }
    }

    /// The same grid with latitude stored north to south.
    pub fn with_descending_lats(mut self) -> Self {
        self.lats.reverse();
        self
    }

    fn n_lat(&self) -> usize {
        self.lats.len()
    }

    fn n_lon(&self) -> usize {
        self.lons.len()
    }
}

/// Write `fixture` for one variable to `path`.
pub(crate) fn write_grid_nc(path: &Path, var: Variable, fixture: &GridFixture) -> PathBuf {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", fixture.times.len()).unwrap();
    file.add_dimension("lat", fixture.n_lat()).unwrap();
    file.add_dimension("lon", fixture.n_lon()).unwrap();
    file.add_attribute("date_created", fixture.date_created.as_str()).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", fixture.time_units.as_str()).unwrap();
    time.put_attribute("calendar", "gregorian").unwrap();
    time.put_values(&fixture.times, ..).unwrap();

    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_values(&fixture.lats, ..).unwrap();
    let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    lon.put_values(&fixture.lons, ..).unwrap();

    let data: Vec<f32> = fixture.values.iter().flatten().copied().collect();
    let mut data_var = file.add_variable::<f32>(var.as_str(), &["time", "lat", "lon"]).unwrap();
    data_var.put_attribute("_FillValue", FILL_VALUE).unwrap();
    data_var.put_attribute("units", var.unit()).unwrap();
    data_var.put_values(&data, ..).unwrap();

    path.to_path_buf()
}

/// Write a monthly file named `nclimgrid_<var>.nc` in `dir`.
pub(crate) fn write_monthly_nc(dir: &Path, var: Variable, fixture: &GridFixture) -> PathBuf {
    write_grid_nc(&dir.join(format!("nclimgrid_{var}.nc")), var, fixture)
}

/// Write a daily file named `<var>-202201-grd-prelim.nc` in `dir`.
pub(crate) fn write_daily_nc(dir: &Path, var: Variable, fixture: &GridFixture) -> PathBuf {
    write_grid_nc(&dir.join(format!("{var}-202201-grd-prelim.nc")), var, fixture)
}

/// Write all four monthly files and return their paths.
pub(crate) fn write_monthly_set(dir: &Path, fixture: &GridFixture) -> VariableMap<PathBuf> {
    VariableMap::from_fn(|var| write_monthly_nc(dir, var, fixture))
}

/// Write all four daily files and return their paths.
pub(crate) fn write_daily_set(dir: &Path, fixture: &GridFixture) -> VariableMap<PathBuf> {
    VariableMap::from_fn(|var| write_daily_nc(dir, var, fixture))
}

pub(crate) fn path_str(p: &Path) -> &str {
    p.to_str().unwrap()
}
