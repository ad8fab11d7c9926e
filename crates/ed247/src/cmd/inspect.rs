use std::fs;

use ed247::{Component, ComponentClocks, Direction};

use crate::cmd::{drain_samples, load_config, parse_hex, InspectArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_samples, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(&args.config)?;
    // A captured frame may come from either side; accept every stream.
    for channel in &mut config.channels {
        for stream in &mut channel.streams {
            stream.direction = Direction::InOut;
        }
    }

    let datagram = match (&args.hex, &args.file) {
        (Some(hex), _) => parse_hex(hex)?,
        (None, Some(path)) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => return Err(CliError::new(USAGE, "one of --hex or --file is required")),
    };

    let mut component = Component::new(config, ComponentClocks::default())
        .map_err(|err| channel_error("invalid component", err))?;
    let report = component
        .decode(&args.channel, &datagram)
        .map_err(|err| channel_error("decode failed", err))?;

    let channel = component
        .channel_mut(&args.channel)
        .ok_or_else(|| CliError::new(USAGE, format!("unknown channel '{}'", args.channel)))?;
    let samples = drain_samples(channel)?;

    if let OutputFormat::Pretty = format {
        match report.header {
            Some(header) => println!(
                "frame: producer={} seq={} blocks={} samples={}",
                header.producer_id, header.sequence_number, report.blocks, report.samples
            ),
            None => println!("frame: blocks={} samples={}", report.blocks, report.samples),
        }
    }
    print_samples(&samples, format);
    Ok(SUCCESS)
}
