use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use ed247::transport::{UdpEndpoint, UdpEndpointConfig};
use ed247::{ChannelError, Component, ComponentClocks};
use serde::Serialize;

use crate::cmd::{load_config, parse_hex, SendArgs};
use crate::exit::{channel_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct SendOutput<'a> {
    channel: &'a str,
    stream: &'a str,
    bytes: usize,
    frames: usize,
    destination: String,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args.config)?;
    let data = parse_hex(&args.hex)?;

    let channel = config
        .channels
        .iter()
        .find(|channel| channel.name == args.channel)
        .ok_or_else(|| CliError::new(USAGE, format!("unknown channel '{}'", args.channel)))?;
    let transport = channel.transport.as_ref();
    let destination = args
        .to
        .or_else(|| transport.and_then(|t| t.destination))
        .ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("channel '{}' has no destination; pass --to", args.channel),
            )
        })?;

    // Send from an ephemeral port so a listener may hold the configured one.
    let defaults = UdpEndpointConfig::default();
    let endpoint_config = UdpEndpointConfig {
        local: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
        destination: Some(destination),
        multicast_group: None,
        multicast_interface: transport.map_or(defaults.multicast_interface, |t| t.multicast_interface),
        multicast_ttl: transport.map_or(defaults.multicast_ttl, |t| t.multicast_ttl),
        multicast_loop: transport.map_or(defaults.multicast_loop, |t| t.multicast_loop),
    };

    let mut component = Component::new(config, ComponentClocks::system())
        .map_err(|err| channel_error("invalid component", err))?;
    let endpoint =
        UdpEndpoint::with_config(endpoint_config).map_err(|err| transport_error("bind failed", err))?;
    component
        .attach_transport(&args.channel, Box::new(endpoint))
        .map_err(|err| channel_error("attach failed", err))?;

    let bytes = data.len();
    component
        .channel_mut(&args.channel)
        .and_then(|channel| channel.stream_mut(&args.stream))
        .ok_or_else(|| ChannelError::UnknownStream(args.stream.clone()))
        .and_then(|stream| stream.push(data, None))
        .map_err(|err| channel_error("push failed", err))?;
    let frames = component
        .send_pushed_samples()
        .map_err(|err| channel_error("send failed", err))?;

    match format {
        OutputFormat::Json => print_json(&SendOutput {
            channel: &args.channel,
            stream: &args.stream,
            bytes,
            frames,
            destination: destination.to_string(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "sent {frames} frame(s): {}/{} {bytes} bytes -> {destination}",
            args.channel, args.stream
        ),
    }
    Ok(SUCCESS)
}
