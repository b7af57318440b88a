use error_stack::ResultExt;

use nclimgrid_stac::cog::CogCheck;
use nclimgrid_stac::constants::Frequency;
use nclimgrid_stac::existence::HrefModifier;
use nclimgrid_stac::hrefs::data_frequency;
use nclimgrid_stac::stac::{create_items, save_item, ItemOptions};

use crate::{print_cog_summary, CliError, CreateItemsCli};

pub(crate) fn create_items_cli(args: CreateItemsCli) -> error_stack::Result<(), CliError> {
    let cfg = args.pipeline.resolve()
        .change_context_lazy(|| CliError::BadInput("Could not load the configuration".to_string()))?;
    let checker = cfg.existence_checker()
        .change_context_lazy(|| CliError::BadInput("Could not set up existence checks".to_string()))?;
    let modifier = cfg.read_href_modifier();
    let modifier_ref = modifier.as_ref().map(|m| m as &dyn HrefModifier);

    let range_err = || CliError::BadInput("Invalid --start/--end".to_string());
    let (day_range, month_range) = match data_frequency(&args.infile) {
        Frequency::Daily => (args.range.day_range().change_context_lazy(range_err)?, None),
        Frequency::Monthly => (None, args.range.month_range().change_context_lazy(range_err)?),
    };

    let cog_dir = args.cog_dir.to_str()
        .ok_or_else(|| CliError::BadInput(format!("COG directory {} is not valid UTF-8", args.cog_dir.display())))?;

    let options = ItemOptions {
        nc_assets: cfg.nc_assets,
        short_circuit: None,
        day_range,
        month_range,
        check: cfg.cog_check_href.as_deref()
            .map(|check_href| CogCheck { check_href, checker: &checker, modifier: modifier_ref }),
        read_href_modifier: modifier_ref,
    };

    let batch = create_items(&args.infile, cog_dir, &options)
        .change_context(CliError::PipelineError)?;

    for mut item in batch.items {
        let path = save_item(&mut item, &args.item_dir)
            .change_context_lazy(|| CliError::IoError(format!("Could not save item {}", item.id)))?;
        log::info!("Wrote item {}", path.display());
    }

    print_cog_summary(&batch.created_cogs, &batch.reused_cogs);
    Ok(())
}
