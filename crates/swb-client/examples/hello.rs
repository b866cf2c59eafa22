//! Minimal end-to-end demo against the simulated device: connect, program
//! a route, read it back, then watch packet-ins until shut down.
//!
//! Run with `cargo run -p swb-client --example hello`.

use std::sync::Arc;
use std::time::Duration;

use swb_client::{Switch, SwitchOptions};
use swb_entity::{Entity, TableAction, TableEntry, TableMatch};
use swb_sim::{fixtures, SimSwitch};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let device = SimSwitch::new(1);

    let options = SwitchOptions::new()
        .with_schema_json(fixtures::basic_schema_json())
        .with_election_id(10u128)
        .with_ready_handler(|sw: Switch| async move {
            let route = TableEntry::new("ipv4_lpm")
                .with_match(TableMatch::new().field("dstAddr", (0x0a00_0000u128, 24u32)))
                .with_action(
                    TableAction::new("ipv4_forward")
                        .arg("dstAddr", 0x0102_0304_0506u64)
                        .arg("port", 1u32),
                );
            if let Err(err) = sw.insert([route]).await {
                info!(error = %err, "insert failed");
                return;
            }

            match sw.read([Entity::from(TableEntry::any())]).await {
                Ok(stream) => match stream.collect_all().await {
                    Ok(entries) => info!(count = entries.len(), "table entries programmed"),
                    Err(err) => info!(error = %err, "read failed"),
                },
                Err(err) => info!(error = %err, "read failed"),
            }

            let mut packets = match sw.read_packets() {
                Ok(packets) => packets,
                Err(err) => {
                    info!(error = %err, "packet subscription failed");
                    return;
                }
            };
            while let Some(packet) = packets.next().await {
                match packet {
                    Ok(packet) => info!(
                        bytes = packet.payload.len(),
                        port = packet.field("ingress_port"),
                        "packet in"
                    ),
                    Err(err) => info!(error = %err, "bad packet in"),
                }
            }
        });

    let switch = Switch::new("sw1", "sim:1", options, Arc::new(device.transport()))?;
    let cancel = CancellationToken::new();

    // Punt a packet at the controller shortly after startup, then stop.
    let stop = cancel.clone();
    let punt = device.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        punt.inject_packet_in(swb_proto::stream::PacketIn {
            payload: bytes::Bytes::from_static(b"hello"),
            metadata: vec![swb_proto::stream::PacketMetadata {
                metadata_id: 1,
                value: bytes::Bytes::from_static(&[1]),
            }],
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.cancel();
    });

    switch.run(cancel).await?;
    info!("shut down cleanly");
    Ok(())
}
