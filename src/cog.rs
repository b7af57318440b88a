//! Rasterize NClimGrid time slices into Cloud-Optimized GeoTIFFs.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use ndarray::{s, Array2};

use crate::constants::{Variable, VariableMap, COG_BLOCKSIZE, EPSG_CODE, TRANSFORM};
use crate::existence::{ExistenceChecker, HrefModifier};
use crate::hrefs::{href_stem, join_href, MONTHLY_PREFIX};
use crate::indices::TemporalUnit;
use crate::netcdf_io::NcDataset;

pub type CogResult<T> = error_stack::Result<T, CogError>;

#[derive(Debug, thiserror::Error)]
pub enum CogError {
    #[error("Could not read the source data from {0}")]
    SourceRead(String),
    #[error("Could not encode the COG {0}")]
    Encode(String),
    #[error("Could not determine whether {0} was already published")]
    Existence(String),
}

/// Where to look for previously published COGs, and how to check that location.
pub struct CogCheck<'a> {
    pub check_href: &'a str,
    pub checker: &'a ExistenceChecker,
    pub modifier: Option<&'a dyn HrefModifier>,
}

/// The COGs for one temporal unit.
#[derive(Debug, Clone)]
pub struct CogSet {
    pub hrefs: VariableMap<String>,
    /// HREFs of the COGs written by this call (as opposed to found at the check location).
    pub created: Vec<String>,
}

/// GDAL-ordered geotransform equivalent to [`TRANSFORM`].
fn gdal_geo_transform() -> [f64; 6] {
    let [a, b, c, d, e, f] = TRANSFORM;
    [c, a, b, f, d, e]
}

/// Name of the COG holding `var` for `unit`.
///
/// Daily COGs take the basename of the netCDF file they come from plus the day
/// (`prcp-202201-grd-prelim-05.tif`); monthly ones are `nclimgrid-<var>-<YYYYMM>.tif`.
pub fn cog_filename(nc_href: &str, var: Variable, unit: &TemporalUnit) -> String {
    match unit {
        TemporalUnit::Day(day) => format!("{}-{day:02}.tif", href_stem(nc_href)),
        TemporalUnit::Month { label, .. } => format!("{MONTHLY_PREFIX}-{var}-{label}.tif"),
    }
}

pub fn get_cog_href(nc_href: &str, var: Variable, cog_dir: &str, unit: &TemporalUnit) -> String {
    join_href(cog_dir, &cog_filename(nc_href, var, unit))
}

/// Read one time slice of `var`, oriented north-up.
fn read_north_up_slice(nc_href: &str, var: Variable, time_index: usize) -> CogResult<Array2<f32>> {
    let ds = NcDataset::open(nc_href)
        .change_context_lazy(|| CogError::SourceRead(nc_href.to_string()))?;
    let slice = ds.grid_slice(var.as_str(), time_index)
        .change_context_lazy(|| CogError::SourceRead(nc_href.to_string()))?;
    let lats = ds.latitudes()
        .change_context_lazy(|| CogError::SourceRead(nc_href.to_string()))?;

    match (lats.first(), lats.last()) {
        (Some(first), Some(last)) if first < last => {
            log::debug!("Latitude in {nc_href} is south to north, flipping rows");
            Ok(slice.slice(s![..;-1, ..]).to_owned())
        }
        _ => Ok(slice),
    }
}

/// Write `grid` to `dest` as a single band float32 COG on the NClimGrid grid.
fn encode_cog(grid: &Array2<f32>, dest: &Path) -> Result<(), gdal::errors::GdalError> {
    let (height, width) = grid.dim();

    let mem_driver = DriverManager::get_driver_by_name("MEM")?;
    let mut mem_ds = mem_driver.create_with_band_type::<f32, _>("", width, height, 1)?;
    mem_ds.set_geo_transform(&gdal_geo_transform())?;
    mem_ds.set_spatial_ref(&SpatialRef::from_epsg(EPSG_CODE)?)?;
    {
        let mut band = mem_ds.rasterband(1)?;
        band.set_no_data_value(Some(f64::NAN))?;
        let mut buffer = Buffer::new((width, height), grid.iter().copied().collect());
        band.write((0, 0), (width, height), &mut buffer)?;
    }

    let mut options = CslStringList::new();
    options.set_name_value("COMPRESS", "DEFLATE")?;
    options.set_name_value("BLOCKSIZE", &COG_BLOCKSIZE.to_string())?;
    let cog_driver = DriverManager::get_driver_by_name("COG")?;
    mem_ds.create_copy(&cog_driver, dest, &options)?;
    Ok(())
}

/// Write time step `time_index` of `var` from `nc_href` to a COG at `cog_path`.
///
/// The file is written under a temporary name and moved into place once complete, so a
/// failure never leaves a partial file at `cog_path`. An existing file is overwritten.
pub fn cog_time_slice(nc_href: &str, var: Variable, cog_path: &Path, time_index: usize) -> CogResult<()> {
    let grid = read_north_up_slice(nc_href, var, time_index)?;

    let dest_str = cog_path.display().to_string();
    if let Some(parent) = cog_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .change_context_lazy(|| CogError::Encode(dest_str.clone()))
            .attach_printable_lazy(|| format!("Could not create directory {}", parent.display()))?;
    }

    let mut partial = cog_path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let written = encode_cog(&grid, &partial)
        .change_context_lazy(|| CogError::Encode(dest_str.clone()))
        .and_then(|_| {
            std::fs::rename(&partial, cog_path)
                .change_context_lazy(|| CogError::Encode(dest_str.clone()))
        });
    if written.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            log::warn!("Could not remove partial file {}: {e}", partial.display());
        }
    }
    written?;

    log::info!("Wrote {dest_str} from time step {time_index} of {nc_href}");
    Ok(())
}

/// Produce (or find) the four COGs for one temporal unit.
///
/// When `check` is given and a COG of the same name already exists at the check
/// location, that HREF is used instead of writing a new file. Only the COGs actually
/// written are listed in [`CogSet::created`].
pub fn create_cogs(nc_hrefs: &VariableMap<String>, cog_dir: &str, unit: &TemporalUnit, check: Option<&CogCheck>) -> CogResult<CogSet> {
    let mut created = vec![];
    let hrefs = VariableMap::try_from_fn(|var| -> CogResult<String> {
        let nc_href = nc_hrefs.get(var);
        let filename = cog_filename(nc_href, var, unit);

        if let Some(check) = check {
            let existing = check.checker.existing_href(check.check_href, &filename, check.modifier)
                .change_context_lazy(|| CogError::Existence(filename.clone()))?;
            if let Some(existing) = existing {
                log::info!("Reusing existing COG {existing}");
                return Ok(existing);
            }
        }

        let cog_href = join_href(cog_dir, &filename);
        cog_time_slice(nc_href, var, Path::new(&cog_href), unit.time_index())?;
        created.push(cog_href.clone());
        Ok(cog_href)
    })?;

    Ok(CogSet { hrefs, created })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{path_str, write_monthly_nc, write_monthly_set, GridFixture};

    fn read_back(path: &Path) -> (Vec<f32>, [f64; 6], Option<f64>) {
        let ds = gdal::Dataset::open(path).unwrap();
        let gt = ds.geo_transform().unwrap();
        let band = ds.rasterband(1).unwrap();
        let (w, h) = band.size();
        let data = band.read_as::<f32>((0, 0), (w, h), (w, h), None).unwrap();
        (data.data().to_vec(), gt, band.no_data_value())
    }

    #[test]
    fn test_cog_filenames() {
        let day = TemporalUnit::Day(5);
        assert_eq!(
            cog_filename("/nc/tmax-202201-grd-prelim.nc", Variable::Tmax, &day),
            "tmax-202201-grd-prelim-05.tif"
        );
        let month = TemporalUnit::Month { index: 2, label: "189502".to_string() };
        assert_eq!(
            get_cog_href("https://h/nclimgrid_tavg.nc", Variable::Tavg, "/cogs", &month),
            "/cogs/nclimgrid-tavg-189502.tif"
        );
    }

    #[test]
    fn test_flip_south_to_north() {
        let tmp = tempfile::tempdir().unwrap();
        let nc = write_monthly_nc(tmp.path(), Variable::Prcp, &GridFixture::monthly());
        let cog = tmp.path().join("out.tif");
        cog_time_slice(path_str(&nc), Variable::Prcp, &cog, 0).unwrap();

        let (data, gt, nodata) = read_back(&cog);
        assert_eq!(data, vec![3.0, 4.0, 1.0, 2.0]);
        for (got, expected) in gt.iter().zip(gdal_geo_transform()) {
            assert!((got - expected).abs() < 1e-9);
        }
        assert!(nodata.unwrap().is_nan());
        assert!(!tmp.path().join("out.tif.partial").exists());
    }

    #[test]
    fn test_no_flip_north_to_south() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = GridFixture::monthly().with_descending_lats();
        let nc = write_monthly_nc(tmp.path(), Variable::Prcp, &fixture);
        let cog = tmp.path().join("out.tif");
        cog_time_slice(path_str(&nc), Variable::Prcp, &cog, 0).unwrap();

        let (data, _, _) = read_back(&cog);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_missing_variable_is_source_error() {
        let tmp = tempfile::tempdir().unwrap();
        let nc = write_monthly_nc(tmp.path(), Variable::Prcp, &GridFixture::monthly());
        let cog = tmp.path().join("out.tif");
        let e = cog_time_slice(path_str(&nc), Variable::Tmin, &cog, 0).unwrap_err();
        assert!(matches!(e.current_context(), CogError::SourceRead(_)));
        assert!(!cog.exists());
    }

    #[test]
    fn test_unwritable_destination_is_encode_error() {
        let tmp = tempfile::tempdir().unwrap();
        let nc = write_monthly_nc(tmp.path(), Variable::Prcp, &GridFixture::monthly());

        // parent "directory" is a regular file
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let cog = blocker.join("out.tif");
        let e = cog_time_slice(path_str(&nc), Variable::Prcp, &cog, 0).unwrap_err();
        assert!(matches!(e.current_context(), CogError::Encode(_)));

        // the COG encodes but cannot be moved over a directory
        let cog = tmp.path().join("taken.tif");
        std::fs::create_dir(&cog).unwrap();
        let e = cog_time_slice(path_str(&nc), Variable::Prcp, &cog, 0).unwrap_err();
        assert!(matches!(e.current_context(), CogError::Encode(_)));
        assert!(!tmp.path().join("taken.tif.partial").exists());
        assert!(cog.is_dir());
    }

    #[test]
    fn test_create_cogs_reuses_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let nc_dir = tmp.path().join("nc");
        let cog_dir = tmp.path().join("cogs");
        let check_dir = tmp.path().join("published");
        std::fs::create_dir_all(&nc_dir).unwrap();
        std::fs::create_dir_all(&check_dir).unwrap();

        let nc_paths = write_monthly_set(&nc_dir, &GridFixture::monthly());
        let nc_hrefs = nc_paths.map(|_, p| path_str(p).to_string());
        let unit = TemporalUnit::Month { index: 1, label: "189501".to_string() };
        for var in [Variable::Prcp, Variable::Tmin] {
            std::fs::write(check_dir.join(cog_filename(nc_hrefs.get(var), var, &unit)), b"published").unwrap();
        }

        let checker = ExistenceChecker::new(Duration::from_secs(5)).unwrap();
        let check = CogCheck { check_href: path_str(&check_dir), checker: &checker, modifier: None };
        let cogs = create_cogs(&nc_hrefs, path_str(&cog_dir), &unit, Some(&check)).unwrap();

        assert_eq!(cogs.created.len(), 2);
        assert!(cogs.hrefs.prcp.starts_with(path_str(&check_dir)));
        assert!(cogs.hrefs.tmin.starts_with(path_str(&check_dir)));
        assert!(cogs.hrefs.tavg.starts_with(path_str(&cog_dir)));
        assert!(cogs.hrefs.tmax.starts_with(path_str(&cog_dir)));
        for href in &cogs.created {
            assert!(Path::new(href).exists());
        }
    }
}
