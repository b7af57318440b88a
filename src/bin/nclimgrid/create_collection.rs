use error_stack::ResultExt;
use itertools::Itertools;

use nclimgrid_stac::cog::CogCheck;
use nclimgrid_stac::existence::HrefModifier;
use nclimgrid_stac::hrefs::{data_frequency, make_absolute_href};
use nclimgrid_stac::stac::{create_collection, create_items, save_collection, ItemOptions};
use nclimgrid_stac::utils::read_href_list;

use crate::{print_cog_summary, CliError, CreateCollectionCli};

/// Directory under the collection directory where COGs are written before being moved
/// next to their Items.
const STAGING_DIR_NAME: &str = ".cog-staging";

pub(crate) fn create_collection_cli(args: CreateCollectionCli) -> error_stack::Result<(), CliError> {
    let cfg = args.pipeline.resolve()
        .change_context_lazy(|| CliError::BadInput("Could not load the configuration".to_string()))?;
    let checker = cfg.existence_checker()
        .change_context_lazy(|| CliError::BadInput("Could not set up existence checks".to_string()))?;
    let modifier = cfg.read_href_modifier();
    let modifier_ref = modifier.as_ref().map(|m| m as &dyn HrefModifier);

    let hrefs = read_href_list(&args.infile)
        .change_context_lazy(|| CliError::BadInput(format!("Could not read HREFs from {}", args.infile.display())))?
        .into_iter()
        .map(|h| make_absolute_href(&h))
        .collect::<Result<Vec<_>, _>>()
        .change_context_lazy(|| CliError::BadInput("Could not make the HREFs absolute".to_string()))?;

    let frequencies = hrefs.iter().map(|h| data_frequency(h)).unique().collect_vec();
    let frequency = match frequencies.as_slice() {
        [f] => *f,
        [] => return Err(CliError::BadInput(format!("No HREFs found in {}", args.infile.display())).into()),
        _ => return Err(CliError::BadInput(
            format!("{} mixes daily and monthly files, a collection may contain only one", args.infile.display())
        ).into()),
    };

    let staging_dir = args.outdir.join(frequency.as_str()).join(STAGING_DIR_NAME);
    let staging = staging_dir.to_str()
        .ok_or_else(|| CliError::BadInput(format!("Output directory {} is not valid UTF-8", args.outdir.display())))?;

    let options = ItemOptions {
        nc_assets: cfg.nc_assets,
        check: cfg.cog_check_href.as_deref()
            .map(|check_href| CogCheck { check_href, checker: &checker, modifier: modifier_ref }),
        read_href_modifier: modifier_ref,
        ..Default::default()
    };

    let mut items = vec![];
    let mut created = vec![];
    let mut reused = vec![];
    for href in hrefs.iter() {
        println!("Processing {href}");
        let batch = create_items(href, staging, &options)
            .change_context(CliError::PipelineError)
            .attach_printable_lazy(|| format!("While processing {href}"))?;
        items.extend(batch.items);
        created.extend(batch.created_cogs);
        reused.extend(batch.reused_cogs);
    }

    let mut collection = create_collection(frequency, cfg.nc_assets);
    let collection_path = save_collection(&mut collection, items, &created, &args.outdir)
        .change_context_lazy(|| CliError::IoError(format!("Could not save the collection in {}", args.outdir.display())))?;

    if staging_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&staging_dir) {
            log::warn!("Could not remove staging directory {}: {e}", staging_dir.display());
        }
    }

    print_cog_summary(&created, &reused);
    println!("Collection written to {}", collection_path.display());
    Ok(())
}
