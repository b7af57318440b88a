//! STAC Items and Collections for NClimGrid COGs.
//!
//! Items are written as plain serde structs rather than through a generic STAC library,
//! with only the fields and extensions (raster, item-assets, scientific) this data uses.
//!
//! The main entry points are [`create_items`], which turns one set of four netCDF files
//! into COGs plus one Item per day or month, and [`create_collection`]. [`save_item`] and
//! [`save_collection`] lay the results out on disk.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use error_stack::ResultExt;
use serde::{Deserialize, Serialize};

use crate::cog::{create_cogs, CogCheck};
use crate::constants::{self, Frequency, Variable, VariableMap};
use crate::existence::HrefModifier;
use crate::hrefs::{self, cog_period, data_frequency, make_absolute_href, make_relative_href, nc_href_dict, CogPeriod};
use crate::indices::{day_indices, month_indices, DayRange, MonthRange, TemporalUnit};
use crate::netcdf_io::{parse_date_created, NcDataset};
use crate::utils::move_asset_file_to_item;

pub type StacResult<T> = error_stack::Result<T, StacError>;

#[derive(Debug, thiserror::Error)]
pub enum StacError {
    #[error("Could not resolve the netCDF files that go with {0}")]
    Href(String),
    #[error("Could not determine the time steps to process in {0}")]
    Indices(String),
    #[error("Could not create the COGs for {0}")]
    Cogs(String),
    #[error("Could not get the creation date of {0}")]
    CreationDate(String),
    #[error("Could not write {0}")]
    Write(PathBuf),
    #[error("Items for a {expected} collection cannot include {actual} item {id}")]
    MixedFrequency { expected: Frequency, actual: Frequency, id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(rel: &str, href: &str) -> Self {
        Self { rel: rel.to_string(), href: href.to_string(), media_type: None, title: None }
    }

    pub fn with_type(mut self, media_type: &str) -> Self {
        self.media_type = Some(media_type.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// One entry of the raster extension's `raster:bands` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterBand {
    pub data_type: String,
    pub nodata: String,
    pub unit: String,
    pub spatial_resolution: u32,
}

impl RasterBand {
    fn for_variable(var: Variable) -> Self {
        Self {
            data_type: "float32".to_string(),
            nodata: "nan".to_string(),
            unit: var.unit().to_string(),
            spatial_resolution: constants::SPATIAL_RESOLUTION_M,
        }
    }
}

/// An Item asset, or (without an `href`) an item-assets definition in a Collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "type")]
    pub media_type: String,
    pub roles: Vec<String>,
    pub title: String,
    #[serde(rename = "raster:bands", default, skip_serializing_if = "Vec::is_empty")]
    pub raster_bands: Vec<RasterBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,
}

impl Asset {
    /// A COG asset definition for `var`, without an HREF.
    pub fn cog(frequency: Frequency, var: Variable) -> Self {
        Self {
            href: None,
            media_type: constants::COG_MEDIA_TYPE.to_string(),
            roles: constants::COG_ROLES.iter().map(|r| r.to_string()).collect(),
            title: format!("{} {}", frequency.title(), var.cog_title()),
            raster_bands: vec![RasterBand::for_variable(var)],
            creation: None,
        }
    }

    /// A netCDF source asset definition for `var`, without an HREF.
    pub fn netcdf(frequency: Frequency, var: Variable) -> Self {
        Self {
            href: None,
            media_type: constants::NETCDF_MEDIA_TYPE.to_string(),
            roles: constants::NETCDF_ROLES.iter().map(|r| r.to_string()).collect(),
            title: format!("{} {}", frequency.title(), var.netcdf_title()),
            raster_bands: vec![],
            creation: None,
        }
    }

    fn with_href(mut self, href: String) -> Self {
        self.href = Some(href);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProperties {
    /// Null for monthly Items, which only have a start and end.
    pub datetime: Option<DateTime<Utc>>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub object_type: String,
    pub stac_version: String,
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub geometry: serde_json::Value,
    pub bbox: [f64; 4],
    pub properties: ItemProperties,
    pub links: Vec<Link>,
    pub assets: BTreeMap<String, Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl Item {
    pub fn frequency(&self) -> Frequency {
        if self.properties.datetime.is_some() {
            Frequency::Daily
        } else {
            Frequency::Monthly
        }
    }

    /// Rewrite local asset HREFs relative to `dir`. URLs are left alone.
    pub fn make_asset_hrefs_relative(&mut self, dir: &Path) {
        let dir = dir.to_string_lossy();
        for asset in self.assets.values_mut() {
            if let Some(href) = asset.href.as_mut() {
                *href = make_relative_href(href, &dir);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub roles: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub bbox: Vec<[f64; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub interval: Vec<[Option<DateTime<Utc>>; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub doi: String,
    pub citation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(rename = "type")]
    pub object_type: String,
    pub stac_version: String,
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub license: String,
    pub providers: Vec<Provider>,
    pub extent: Extent,
    pub links: Vec<Link>,
    pub item_assets: BTreeMap<String, Asset>,
    #[serde(rename = "sci:doi", default, skip_serializing_if = "Option::is_none")]
    pub sci_doi: Option<String>,
    #[serde(rename = "sci:citation", default, skip_serializing_if = "Option::is_none")]
    pub sci_citation: Option<String>,
    #[serde(rename = "sci:publications", default, skip_serializing_if = "Vec::is_empty")]
    pub sci_publications: Vec<Publication>,
}

impl Collection {
    pub fn frequency(&self) -> Frequency {
        if self.id == constants::DAILY_COLLECTION_ID {
            Frequency::Daily
        } else {
            Frequency::Monthly
        }
    }

    /// Set the extent to the union of the Items' bounding boxes and time spans.
    pub fn update_extent_from_items(&mut self, items: &[Item]) {
        let Some(first) = items.first() else {
            return;
        };

        let mut bbox = first.bbox;
        let mut start = first.properties.start_datetime;
        let mut end = first.properties.end_datetime;
        for item in &items[1..] {
            bbox[0] = bbox[0].min(item.bbox[0]);
            bbox[1] = bbox[1].min(item.bbox[1]);
            bbox[2] = bbox[2].max(item.bbox[2]);
            bbox[3] = bbox[3].max(item.bbox[3]);
            start = start.min(item.properties.start_datetime);
            end = end.max(item.properties.end_datetime);
        }

        self.extent.spatial.bbox = vec![bbox];
        self.extent.temporal.interval = vec![[Some(start), Some(end)]];
    }
}

/// The netCDF file an Item's source asset points to.
#[derive(Debug, Clone, PartialEq)]
pub struct NcSource {
    pub href: String,
    /// `date_created` of the file, as an RFC 3339 UTC timestamp
    pub creation: Option<String>,
}

/// Bounding box of the grid, computed from the fixed transform.
fn grid_bbox() -> [f64; 4] {
    let [a, _, c, _, e, f] = constants::TRANSFORM;
    let west = c;
    let north = f;
    let east = c + a * constants::GRID_WIDTH as f64;
    let south = f + e * constants::GRID_HEIGHT as f64;
    [west, south, east, north]
}

fn bbox_polygon(bbox: [f64; 4]) -> serde_json::Value {
    let [west, south, east, north] = bbox;
    serde_json::json!({
        "type": "Polygon",
        "coordinates": [[
            [east, south],
            [east, north],
            [west, north],
            [west, south],
            [east, south],
        ]],
    })
}

fn utc_datetime(date: NaiveDate, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    let naive = date.and_hms_opt(h, m, s).unwrap_or_default();
    Utc.from_utc_datetime(&naive)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Create an Item for one temporal unit from its four COG HREFs.
///
/// The Item's id and time span come from the name of the precipitation COG. With
/// `nc_sources`, `<var>_source` assets pointing at the netCDF files are added as well.
pub fn create_item(cog_hrefs: &VariableMap<String>, nc_sources: Option<&VariableMap<NcSource>>) -> StacResult<Item> {
    let prcp = &cog_hrefs.prcp;
    let frequency = data_frequency(prcp);
    let period = cog_period(prcp)
        .change_context_lazy(|| StacError::Href(prcp.clone()))?;

    let (id, datetime, start, end) = match period {
        CogPeriod::Day(date) => {
            let start = utc_datetime(date, 0, 0, 0);
            (date.format("%Y%m%d").to_string(), Some(start), start, utc_datetime(date, 23, 59, 59))
        }
        CogPeriod::Month { year, month } => {
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| StacError::Href(prcp.clone()))?;
            let last = last_day_of_month(year, month)
                .ok_or_else(|| StacError::Href(prcp.clone()))?;
            (
                format!("{}-{year:04}{month:02}", hrefs::MONTHLY_PREFIX),
                None,
                utc_datetime(first, 0, 0, 0),
                utc_datetime(last, 23, 59, 59),
            )
        }
    };

    let mut assets = BTreeMap::new();
    for (var, href) in cog_hrefs.iter() {
        let href = make_absolute_href(href)
            .change_context_lazy(|| StacError::Href(href.clone()))?;
        assets.insert(var.to_string(), Asset::cog(frequency, var).with_href(href));
    }
    if let Some(sources) = nc_sources {
        for (var, source) in sources.iter() {
            let href = make_absolute_href(&source.href)
                .change_context_lazy(|| StacError::Href(source.href.clone()))?;
            let mut asset = Asset::netcdf(frequency, var).with_href(href);
            asset.creation = source.creation.clone();
            assets.insert(var.source_asset_key(), asset);
        }
    }

    let bbox = grid_bbox();
    Ok(Item {
        object_type: "Feature".to_string(),
        stac_version: constants::STAC_VERSION.to_string(),
        stac_extensions: vec![constants::RASTER_EXTENSION_V11.to_string()],
        id,
        geometry: bbox_polygon(bbox),
        bbox,
        properties: ItemProperties { datetime, start_datetime: start, end_datetime: end, created: Utc::now() },
        links: vec![],
        assets,
        collection: None,
    })
}

/// Optional behavior of [`create_items`].
#[derive(Default)]
pub struct ItemOptions<'a> {
    /// Add `<var>_source` assets for the netCDF files.
    pub nc_assets: bool,
    /// Consulted before each temporal unit, newest first. Returning `true` stops processing
    /// of that unit and all older ones.
    pub short_circuit: Option<&'a dyn Fn(&TemporalUnit) -> bool>,
    /// Restrict daily files to these days.
    pub day_range: Option<DayRange>,
    /// Restrict monthly files to these months.
    pub month_range: Option<MonthRange>,
    /// Reuse COGs already present at a check location.
    pub check: Option<CogCheck<'a>>,
    /// Applied to the netCDF HREFs before they are read, e.g. to add an access token.
    pub read_href_modifier: Option<&'a dyn HrefModifier>,
}

/// Items created from one set of netCDF files.
#[derive(Debug, Clone)]
pub struct ItemBatch {
    pub items: Vec<Item>,
    /// COG files written while creating these Items.
    pub created_cogs: Vec<String>,
    /// COGs found at the check location and reused.
    pub reused_cogs: Vec<String>,
}

fn nc_sources(nc_hrefs: &VariableMap<String>, read_hrefs: &VariableMap<String>) -> StacResult<VariableMap<NcSource>> {
    VariableMap::try_from_fn(|var| -> StacResult<NcSource> {
        let read_href = read_hrefs.get(var);
        let raw = {
            let ds = NcDataset::open(read_href)
                .change_context_lazy(|| StacError::CreationDate(nc_hrefs.get(var).clone()))?;
            ds.date_created()
                .change_context_lazy(|| StacError::CreationDate(nc_hrefs.get(var).clone()))?
        };
        let created = parse_date_created(&raw)
            .ok_or_else(|| error_stack::Report::new(StacError::CreationDate(nc_hrefs.get(var).clone()))
                .attach_printable(format!("could not parse date_created value '{raw}'")))?;
        Ok(NcSource {
            href: nc_hrefs.get(var).clone(),
            creation: Some(created.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        })
    })
}

/// Create COGs and Items for every day or month in a set of NClimGrid netCDF files.
///
/// `nc_href` may point to the file of any of the four variables; the other three must
/// sit next to it. COGs are written to `cog_dir`.
pub fn create_items(nc_href: &str, cog_dir: &str, options: &ItemOptions) -> StacResult<ItemBatch> {
    let frequency = data_frequency(nc_href);
    let nc_hrefs = nc_href_dict(nc_href)
        .change_context_lazy(|| StacError::Href(nc_href.to_string()))?;
    let read_hrefs = match options.read_href_modifier {
        Some(m) => nc_hrefs.map(|_, h| m.modify(h)),
        None => nc_hrefs.clone(),
    };

    let sources = if options.nc_assets {
        Some(nc_sources(&nc_hrefs, &read_hrefs)?)
    } else {
        None
    };

    let units = match frequency {
        Frequency::Daily => day_indices(&read_hrefs.prcp, options.day_range),
        Frequency::Monthly => month_indices(&read_hrefs.prcp, options.month_range.as_ref()),
    }.change_context_lazy(|| StacError::Indices(nc_hrefs.prcp.clone()))?;
    log::info!("Processing {} {frequency} unit(s) from {}", units.len(), nc_hrefs.prcp);

    let mut batch = ItemBatch { items: vec![], created_cogs: vec![], reused_cogs: vec![] };
    for unit in units {
        if options.short_circuit.is_some_and(|stop| stop(&unit)) {
            log::info!("Stopping at {unit}, it and older data are skipped");
            break;
        }

        let cogs = create_cogs(&read_hrefs, cog_dir, &unit, options.check.as_ref())
            .change_context_lazy(|| StacError::Cogs(format!("{unit} of {}", nc_hrefs.prcp)))?;
        let item = create_item(&cogs.hrefs, sources.as_ref())?;
        log::debug!("Created item {}", item.id);

        batch.reused_cogs.extend(
            cogs.hrefs.iter()
                .map(|(_, h)| h)
                .filter(|h| !cogs.created.contains(h))
                .cloned()
        );
        batch.created_cogs.extend(cogs.created);
        batch.items.push(item);
    }
    Ok(batch)
}

/// Create the Collection for monthly or daily NClimGrid data. It has no Items yet.
pub fn create_collection(frequency: Frequency, nc_assets: bool) -> Collection {
    let (id, title, description, start_year) = match frequency {
        Frequency::Monthly => (
            constants::MONTHLY_COLLECTION_ID,
            constants::MONTHLY_COLLECTION_TITLE,
            constants::MONTHLY_COLLECTION_DESCRIPTION,
            constants::MONTHLY_START_YEAR,
        ),
        Frequency::Daily => (
            constants::DAILY_COLLECTION_ID,
            constants::DAILY_COLLECTION_TITLE,
            constants::DAILY_COLLECTION_DESCRIPTION,
            constants::DAILY_START_YEAR,
        ),
    };

    let mut item_assets = BTreeMap::new();
    for var in Variable::ALL {
        item_assets.insert(var.to_string(), Asset::cog(frequency, var));
        if nc_assets {
            item_assets.insert(var.source_asset_key(), Asset::netcdf(frequency, var));
        }
    }

    let start = Utc.with_ymd_and_hms(start_year, 1, 1, 0, 0, 0).single();
    let mut collection = Collection {
        object_type: "Collection".to_string(),
        stac_version: constants::STAC_VERSION.to_string(),
        stac_extensions: vec![
            constants::ITEM_ASSETS_EXTENSION.to_string(),
            constants::RASTER_EXTENSION_V11.to_string(),
        ],
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        keywords: constants::KEYWORDS.iter().map(|k| k.to_string()).collect(),
        license: constants::LICENSE.to_string(),
        providers: vec![Provider {
            name: constants::PROVIDER_NAME.to_string(),
            roles: vec!["producer".to_string(), "licensor".to_string()],
            url: constants::PROVIDER_URL.to_string(),
        }],
        extent: Extent {
            spatial: SpatialExtent { bbox: vec![constants::CONUS_BBOX] },
            temporal: TemporalExtent { interval: vec![[start, None]] },
        },
        links: vec![],
        item_assets,
        sci_doi: None,
        sci_citation: None,
        sci_publications: vec![],
    };

    match frequency {
        Frequency::Monthly => {
            collection.stac_extensions.insert(0, constants::SCIENTIFIC_EXTENSION.to_string());
            collection.sci_doi = Some(constants::MONTHLY_DATA_DOI.to_string());
            collection.sci_citation = Some(constants::MONTHLY_DATA_CITATION.to_string());
            collection.sci_publications = vec![Publication {
                doi: constants::MONTHLY_PUBLICATION_DOI.to_string(),
                citation: constants::MONTHLY_PUBLICATION_CITATION.to_string(),
            }];
            collection.links.push(
                Link::new("cite-as", constants::MONTHLY_DATA_URL)
                    .with_type(constants::HTML_MEDIA_TYPE)
                    .with_title(constants::MONTHLY_COLLECTION_TITLE)
            );
        }
        Frequency::Daily => {
            collection.links.push(
                Link::new("describedby", constants::DAILY_DESCRIBEDBY_URL)
                    .with_type(constants::PDF_MEDIA_TYPE)
                    .with_title(constants::DAILY_DESCRIBEDBY_TITLE)
            );
        }
    }

    collection.links.push(
        Link::new("license", constants::LICENSE_URL)
            .with_type(constants::HTML_MEDIA_TYPE)
            .with_title(constants::LICENSE_TITLE)
    );
    collection.links.push(
        Link::new("about", constants::LANDING_PAGE_URL)
            .with_type(constants::HTML_MEDIA_TYPE)
            .with_title(constants::LANDING_PAGE_TITLE)
    );
    collection
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> StacResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .change_context_lazy(|| StacError::Write(path.to_path_buf()))?;
    }
    let json = serde_json::to_string_pretty(value)
        .change_context_lazy(|| StacError::Write(path.to_path_buf()))?;
    std::fs::write(path, json)
        .change_context_lazy(|| StacError::Write(path.to_path_buf()))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Write a standalone Item to `<item_dir>/<id>.json`, with asset HREFs relative to it.
pub fn save_item(item: &mut Item, item_dir: &Path) -> StacResult<PathBuf> {
    let path = item_dir.join(format!("{}.json", item.id));
    item.make_asset_hrefs_relative(item_dir);
    write_json(item, &path)?;
    Ok(path)
}

/// Write a self-contained catalog: `<outdir>/<frequency>/collection.json` plus each Item at
/// `<outdir>/<frequency>/<id>/<id>.json`.
///
/// COGs listed in `created_cogs` are moved next to the Item that uses them; when a file of
/// the same name is already there it is kept. Other COGs (e.g. reused from a check location)
/// stay where they are. All local asset HREFs are made relative and the collection extent
/// is set from the Items. Returns the path of the collection file.
pub fn save_collection(collection: &mut Collection, mut items: Vec<Item>, created_cogs: &[String], outdir: &Path) -> StacResult<PathBuf> {
    let frequency = collection.frequency();
    for item in &items {
        if item.frequency() != frequency {
            return Err(StacError::MixedFrequency { expected: frequency, actual: item.frequency(), id: item.id.clone() }.into());
        }
    }

    let movable: Vec<String> = created_cogs.iter()
        .filter_map(|h| make_absolute_href(h).ok())
        .collect();
    let collection_dir = outdir.join(frequency.as_str());
    let collection_path = collection_dir.join("collection.json");

    items.sort_by(|a, b| a.id.cmp(&b.id));
    collection.update_extent_from_items(&items);
    collection.links.retain(|l| !matches!(l.rel.as_str(), "root" | "item" | "self"));
    collection.links.insert(0, Link::new("root", "./collection.json").with_type(constants::JSON_MEDIA_TYPE).with_title(&collection.title));

    for item in items.iter_mut() {
        let item_dir = collection_dir.join(&item.id);
        for var in Variable::ALL {
            let Some(asset) = item.assets.get_mut(var.as_str()) else {
                continue;
            };
            let Some(href) = asset.href.as_ref().filter(|h| movable.contains(h)) else {
                continue;
            };
            let moved = move_asset_file_to_item(Path::new(href), &item_dir, true)
                .change_context_lazy(|| StacError::Write(item_dir.clone()))?;
            asset.href = Some(moved.to_string_lossy().to_string());
        }
        item.make_asset_hrefs_relative(&item_dir);

        item.collection = Some(collection.id.clone());
        item.links = vec![
            Link::new("root", "../collection.json").with_type(constants::JSON_MEDIA_TYPE).with_title(&collection.title),
            Link::new("collection", "../collection.json").with_type(constants::JSON_MEDIA_TYPE).with_title(&collection.title),
            Link::new("parent", "../collection.json").with_type(constants::JSON_MEDIA_TYPE).with_title(&collection.title),
        ];
        write_json(item, &item_dir.join(format!("{}.json", item.id)))?;

        collection.links.push(
            Link::new("item", &format!("./{0}/{0}.json", item.id)).with_type(constants::JSON_MEDIA_TYPE)
        );
    }

    write_json(collection, &collection_path)?;
    log::info!("Wrote collection {} with {} item(s) to {}", collection.id, items.len(), collection_path.display());
    Ok(collection_path)
}
