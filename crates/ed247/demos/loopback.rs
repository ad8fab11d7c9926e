//! Loopback demo: one component sends A429 words and discrete signals to
//! another over UDP on localhost.
//!
//! Run with:
//!   cargo run --example loopback

use std::time::Duration;

use ed247::frame::{HeaderMode, StreamProtocol};
use ed247::signal::{ElementSize, SignalConfig};
use ed247::transport::UdpEndpoint;
use ed247::{ChannelConfig, Component, ComponentClocks, ComponentConfig, Direction, StreamConfig};

fn component(name: &str, id: u16, direction: Direction) -> ComponentConfig {
    let labels = StreamConfig::new("labels", 1, StreamProtocol::A429, direction, 4)
        .with_sample_max_number(8);
    let discretes = StreamConfig::new("discretes", 2, StreamProtocol::Discrete, direction, 4)
        .with_signals(vec![
            SignalConfig::fixed("gear_down", ElementSize::One, 1, 0),
            SignalConfig::fixed("flaps", ElementSize::Two, 1, 2),
        ]);

    ComponentConfig {
        name: name.to_string(),
        component_id: id,
        channels: vec![ChannelConfig::new("bus", vec![labels, discretes])
            .with_header(HeaderMode::EnabledWithTimestamp)],
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rx_socket = UdpEndpoint::bind("127.0.0.1:0".parse()?)?;
    let tx_socket = UdpEndpoint::bind("127.0.0.1:0".parse()?)?.with_destination(rx_socket.local_addr()?);

    let mut sender = Component::new(component("fcc", 1, Direction::Out), ComponentClocks::system())?;
    let mut receiver =
        Component::new(component("display", 2, Direction::In), ComponentClocks::system())?;
    sender.attach_transport("bus", Box::new(tx_socket))?;
    receiver.attach_transport("bus", Box::new(rx_socket))?;

    for round in 0..3u16 {
        let labels = sender.stream_mut("labels").ok_or("no labels stream")?;
        for word in 0..=round {
            labels.push((0x0100_0000u32 | u32::from(word)).to_be_bytes().to_vec(), None)?;
        }

        let discretes = sender.stream_mut("discretes").ok_or("no discretes stream")?;
        discretes.write_signal("gear_down", &[u8::from(round == 0)])?;
        discretes.write_signal("flaps", &(round * 10).to_ne_bytes())?;
        discretes.push_signals(None)?;

        sender.send_pushed_samples()?;

        let report = receiver.wait_frame("bus", Some(Duration::from_secs(1)))?;
        eprintln!(
            "[display] frame seq={:?} blocks={} samples={}",
            report.header.map(|h| h.sequence_number),
            report.blocks,
            report.samples
        );

        let labels = receiver.stream_mut("labels").ok_or("no labels stream")?;
        while let Some(popped) = labels.pop()? {
            eprintln!("[display] label {:02x?}", popped.sample.data());
        }

        let discretes = receiver.stream_mut("discretes").ok_or("no discretes stream")?;
        if discretes.pop_signals()?.is_some() {
            let gear = discretes.read_signal("gear_down")?[0];
            let flaps = discretes.read_signal("flaps")?;
            let flaps = u16::from_ne_bytes([flaps[0], flaps[1]]);
            eprintln!("[display] gear_down={gear} flaps={flaps}");
        }
    }

    eprintln!("[display] metrics {:?}", receiver.metrics());
    Ok(())
}
