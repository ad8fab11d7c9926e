use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ed247::transport::{UdpEndpoint, UdpEndpointConfig};
use ed247::{Component, ComponentClocks, ComponentConfig};
use tracing::{debug, info};

use crate::cmd::{drain_samples, load_config, parse_duration, ListenArgs};
use crate::exit::{
    channel_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_samples, OutputFormat};

/// Longest single wait, so Ctrl-C is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args.config)?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let endpoint_config = endpoint_config(&config, &args)?;

    let mut component = Component::new(config, ComponentClocks::system())
        .map_err(|err| channel_error("invalid component", err))?;
    let endpoint =
        UdpEndpoint::with_config(endpoint_config).map_err(|err| transport_error("bind failed", err))?;
    info!(channel = %args.channel, local = ?endpoint.local_addr().ok(), "listening");
    component
        .attach_transport(&args.channel, Box::new(endpoint))
        .map_err(|err| channel_error("attach failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let poll = timeout.map_or(POLL_INTERVAL, |t| t.min(POLL_INTERVAL));
    let mut frames = 0usize;
    let mut last_frame = Instant::now();

    while running.load(Ordering::SeqCst) {
        match component.wait_frame(&args.channel, Some(poll)) {
            Ok(report) => {
                last_frame = Instant::now();
                frames = frames.saturating_add(1);
                debug!(samples = report.samples, missed = report.missed_frames, "frame received");

                let channel = component.channel_mut(&args.channel).ok_or_else(|| {
                    CliError::new(USAGE, format!("unknown channel '{}'", args.channel))
                })?;
                let samples = drain_samples(channel)?;
                print_samples(&samples, format);

                if args.count.is_some_and(|count| frames >= count) {
                    break;
                }
            }
            Err(err) if err.is_timeout() => {
                if let Some(timeout) = timeout {
                    if last_frame.elapsed() >= timeout {
                        return Err(CliError::new(
                            TIMEOUT,
                            format!("no frame received within {timeout:?}"),
                        ));
                    }
                }
            }
            // Already logged by the channel; the next datagram is independent.
            Err(err) if err.is_decode_failure() => {}
            Err(err) => return Err(channel_error("receive failed", err)),
        }
    }

    let metrics = component.metrics();
    info!(
        frames,
        missed_frames = metrics.missed_frames,
        decode_failures = metrics.decode_failures,
        evicted_samples = metrics.evicted_samples,
        "listen finished"
    );
    Ok(SUCCESS)
}

fn endpoint_config(config: &ComponentConfig, args: &ListenArgs) -> CliResult<UdpEndpointConfig> {
    let channel = config
        .channels
        .iter()
        .find(|channel| channel.name == args.channel)
        .ok_or_else(|| CliError::new(USAGE, format!("unknown channel '{}'", args.channel)))?;

    let mut endpoint = match (&channel.transport, args.bind) {
        (Some(transport), _) => transport.endpoint_config(),
        (None, Some(_)) => UdpEndpointConfig::default(),
        (None, None) => {
            return Err(CliError::new(
                USAGE,
                format!(
                    "channel '{}' has no transport; pass --bind",
                    args.channel
                ),
            ))
        }
    };
    if let Some(bind) = args.bind {
        endpoint.local = bind;
    }
    if let Some(group) = args.group {
        endpoint.multicast_group = Some(group);
    }
    Ok(endpoint)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
