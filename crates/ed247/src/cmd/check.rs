use ed247::{Component, ComponentClocks};

use crate::cmd::{load_config, CheckArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_config, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args.config)?;
    // Building the component checks signal layouts and queue sizes as well.
    Component::new(config.clone(), ComponentClocks::default())
        .map_err(|err| channel_error("invalid component", err))?;

    print_config(&config, format);
    Ok(SUCCESS)
}
