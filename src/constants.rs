use std::{fmt::Display, str::FromStr};

use serde::Serialize;

/// Number of columns (longitudes) in the NClimGrid CONUS grid
pub const GRID_WIDTH: usize = 1385;
/// Number of rows (latitudes) in the NClimGrid CONUS grid
pub const GRID_HEIGHT: usize = 596;

/// Affine transform of the NClimGrid grid in row-major `[a, b, c, d, e, f]` order, i.e.
/// `x = a * col + b * row + c` and `y = d * col + e * row + f`.
pub const TRANSFORM: [f64; 6] = [0.04166667, 0.0, -124.70833333, 0.0, -0.04166667, 49.37500127];

pub const EPSG_CODE: u32 = 4326;
pub const COG_BLOCKSIZE: usize = 512;
/// Nominal ground resolution of a grid cell, in meters
pub const SPATIAL_RESOLUTION_M: u32 = 5000;

pub const COG_MEDIA_TYPE: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
pub const NETCDF_MEDIA_TYPE: &str = "application/netcdf";
pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const HTML_MEDIA_TYPE: &str = "text/html";
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

pub const STAC_VERSION: &str = "1.0.0";
pub const RASTER_EXTENSION_V11: &str = "https://stac-extensions.github.io/raster/v1.1.0/schema.json";
pub const ITEM_ASSETS_EXTENSION: &str = "https://stac-extensions.github.io/item-assets/v1.0.0/schema.json";
pub const SCIENTIFIC_EXTENSION: &str = "https://stac-extensions.github.io/scientific/v1.0.0/schema.json";

pub const COG_ROLES: &[&str] = &["data"];
pub const NETCDF_ROLES: &[&str] = &["data", "source"];

/// Spatial extent of the CONUS grid as `[west, south, east, north]`
pub const CONUS_BBOX: [f64; 4] = [-124.708333, 24.541666, -66.999995, 49.375001];

pub const KEYWORDS: &[&str] = &[
    "NOAA",
    "NClimGrid",
    "Air Temperature",
    "Precipitation",
    "Surface Observations",
    "Climatology",
    "CONUS",
];

pub const LANDING_PAGE_URL: &str = "https://www.ncei.noaa.gov/access/metadata/landing-page/bin/iso?id=gov.noaa.ncdc:C00332";
pub const LICENSE_URL: &str = "https://www.ncei.noaa.gov/access/metadata/landing-page/bin/iso?id=gov.noaa.ncdc:C00332#Constraints";
pub const LANDING_PAGE_TITLE: &str = "Product Landing Page";
pub const LICENSE_TITLE: &str = "NClimGrid Data Use and Access Constraints";
pub const LICENSE: &str = "proprietary";
pub const PROVIDER_NAME: &str = "NOAA National Centers for Environmental Information";
pub const PROVIDER_URL: &str = "https://www.ncei.noaa.gov/";

pub const MONTHLY_COLLECTION_ID: &str = "noaa-nclimgrid-monthly";
pub const MONTHLY_COLLECTION_TITLE: &str = "NOAA Monthly U.S. Climate Gridded Dataset (NClimGrid)";
pub const MONTHLY_COLLECTION_DESCRIPTION: &str = "The NOAA Monthly U.S. Climate Gridded Dataset (NClimGrid) consists of \
four climate variables derived from the Global Historical Climatology Network Daily dataset (GHCN-D): \
maximum temperature, minimum temperature, average temperature, and precipitation. Monthly values in a \
1/24 degree lat/lon grid (nominal 5x5 kilometer) are provided for the Continental United States. \
Monthly data is available from 1895 to the present.";
pub const MONTHLY_START_YEAR: i32 = 1895;
pub const MONTHLY_DATA_DOI: &str = "10.7289/V5SX6B56";
pub const MONTHLY_DATA_CITATION: &str = "Vose, Russell S., Applequist, Scott, Squires, Mike, Durre, Imke, Menne, \
Matthew J., Williams, Claude N. Jr., Fenimore, Chris, Gleason, Karin, and Arndt, Derek (2014): NOAA Monthly \
U.S. Climate Gridded Dataset (NClimGrid), Version 1. NOAA National Centers for Environmental Information. \
DOI:10.7289/V5SX6B56.";
pub const MONTHLY_DATA_URL: &str = "https://doi.org/10.7289/V5SX6B56";
pub const MONTHLY_PUBLICATION_DOI: &str = "10.1175/JAMC-D-13-0248.1";
pub const MONTHLY_PUBLICATION_CITATION: &str = "Vose, R. S., Applequist, S., Squires, M., Durre, I., Menne, M. J., \
Williams, C. N., Jr., Fenimore, C., Gleason, K., & Arndt, D. (2014). Improved Historical Temperature and \
Precipitation Time Series for U.S. Climate Divisions, Journal of Applied Meteorology and Climatology, \
53(5), 1232-1251.";

pub const DAILY_COLLECTION_ID: &str = "noaa-nclimgrid-daily";
pub const DAILY_COLLECTION_TITLE: &str = "NOAA Daily U.S. Climate Gridded Dataset (NClimGrid-d)";
pub const DAILY_COLLECTION_DESCRIPTION: &str = "The NOAA Daily U.S. Climate Gridded Dataset (NClimGrid-d) consists of \
four climate variables derived from the Global Historical Climatology Network Daily dataset (GHCN-D): \
maximum temperature, minimum temperature, average temperature, and precipitation. Daily values in a \
1/24 degree lat/lon (nominal 5x5 kilometer) grid are provided for the Continental United States. \
Daily data is available from 1951 to the present.";
pub const DAILY_START_YEAR: i32 = 1951;
pub const DAILY_DESCRIBEDBY_URL: &str = "https://www1.ncdc.noaa.gov/pub/data/daily-grids/docs/nclimdiv-description.pdf";
pub const DAILY_DESCRIBEDBY_TITLE: &str = "NOAA Daily NClimGrid Product Description";


#[derive(Debug, thiserror::Error)]
pub enum ConstantParseError {
    #[error("'{0}' is not one of prcp, tavg, tmax, or tmin")]
    UnknownVariable(String),
}

/// The data cadence of a set of NClimGrid files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Monthly => "monthly",
        }
    }

    /// The frequency name with a leading capital, as used in asset titles.
    pub fn title(&self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Monthly => "Monthly",
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the four NClimGrid climate variables. Each variable lives in its own netCDF file
/// and gets its own COG and asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Prcp,
    Tavg,
    Tmax,
    Tmin,
}

impl Variable {
    /// All variables, in the order assets are written.
    pub const ALL: [Variable; 4] = [Variable::Prcp, Variable::Tavg, Variable::Tmax, Variable::Tmin];

    /// The token used for this variable in file names and as the netCDF variable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Prcp => "prcp",
            Variable::Tavg => "tavg",
            Variable::Tmax => "tmax",
            Variable::Tmin => "tmin",
        }
    }

    pub fn cog_title(&self) -> &'static str {
        match self {
            Variable::Prcp => "Precipitation (mm)",
            Variable::Tavg => "Average Temperature (degree Celsius)",
            Variable::Tmax => "Maximum Temperature (degree Celsius)",
            Variable::Tmin => "Minimum Temperature (degree Celsius)",
        }
    }

    pub fn netcdf_title(&self) -> &'static str {
        match self {
            Variable::Prcp => "Precipitation Source Data",
            Variable::Tavg => "Average Temperature Source Data",
            Variable::Tmax => "Maximum Temperature Source Data",
            Variable::Tmin => "Minimum Temperature Source Data",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Variable::Prcp => "mm",
            Variable::Tavg | Variable::Tmax | Variable::Tmin => "degree Celsius",
        }
    }

    /// Key for the netCDF source asset of this variable in an Item.
    pub fn source_asset_key(&self) -> String {
        format!("{}_source", self.as_str())
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Variable {
    type Err = ConstantParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prcp" => Ok(Self::Prcp),
            "tavg" => Ok(Self::Tavg),
            "tmax" => Ok(Self::Tmax),
            "tmin" => Ok(Self::Tmin),
            _ => Err(ConstantParseError::UnknownVariable(s.to_string())),
        }
    }
}

/// A value for each of the four variables.
///
/// Unlike a hash map, this always holds exactly one entry per [`Variable`], so code
/// consuming it can never silently skip a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableMap<T> {
    pub prcp: T,
    pub tavg: T,
    pub tmax: T,
    pub tmin: T,
}

impl<T> VariableMap<T> {
    pub fn from_fn<F: FnMut(Variable) -> T>(mut f: F) -> Self {
        Self {
            prcp: f(Variable::Prcp),
            tavg: f(Variable::Tavg),
            tmax: f(Variable::Tmax),
            tmin: f(Variable::Tmin),
        }
    }

    /// Like [`VariableMap::from_fn`], but stops at the first error.
    pub fn try_from_fn<E, F: FnMut(Variable) -> Result<T, E>>(mut f: F) -> Result<Self, E> {
        Ok(Self {
            prcp: f(Variable::Prcp)?,
            tavg: f(Variable::Tavg)?,
            tmax: f(Variable::Tmax)?,
            tmin: f(Variable::Tmin)?,
        })
    }

    pub fn get(&self, var: Variable) -> &T {
        match var {
            Variable::Prcp => &self.prcp,
            Variable::Tavg => &self.tavg,
            Variable::Tmax => &self.tmax,
            Variable::Tmin => &self.tmin,
        }
    }

    pub fn map<U, F: FnMut(Variable, &T) -> U>(&self, mut f: F) -> VariableMap<U> {
        VariableMap::from_fn(|var| f(var, self.get(var)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Variable, &T)> {
        Variable::ALL.into_iter().map(move |var| (var, self.get(var)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_round_trip_names() {
        for var in Variable::ALL {
            assert_eq!(Variable::from_str(var.as_str()).unwrap(), var);
        }
        assert!(Variable::from_str("PRCP").is_err());
    }

    #[test]
    fn test_variable_map_order() {
        let m = VariableMap::from_fn(|v| v.as_str().to_string());
        let keys: Vec<_> = m.iter().map(|(v, s)| (v, s.clone())).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], (Variable::Prcp, "prcp".to_string()));
        assert_eq!(keys[3], (Variable::Tmin, "tmin".to_string()));
    }

    #[test]
    fn test_frequency_names() {
        assert_eq!(Frequency::Monthly.to_string(), "monthly");
        assert_eq!(Frequency::Daily.title(), "Daily");
    }
}
