//! Interactive BLE tester shell.
//!
//! Run with: cargo run --example ble_tester
//!
//! Commands:
//!   pair [service-uuid]   choose a device, optionally hinting a service
//!   paired                list paired devices
//!   use <n>               make paired device <n> the active one
//!   connect               connect and list characteristics
//!   disconnect            disconnect the active device
//!   scan                  start and stop an advertisement scan
//!   status                print the current state
//!   quit

use ble_tester::{
    BleTester, BtleplugAdapter, ChooserConfig, PairedDevices, Result, SessionSnapshot,
    TesterConfig,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_tester=debug".parse().unwrap()),
        )
        .init();

    println!("Bluetooth tester");

    let adapter = BtleplugAdapter::new(ChooserConfig::default()).await?;
    let tester = BleTester::new(Arc::new(adapter), TesterConfig::default());

    println!("{}", tester.availability().await);

    let _handle = tester.on_state_changed(|snapshot| {
        println!("[{}] {}", snapshot.updated_at.format("%H:%M:%S"), describe(&snapshot));
    });

    let mut paired = PairedDevices::Empty;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                break;
            }
        };

        let mut words = line.split_whitespace();
        match words.next() {
            Some("pair") => {
                let filter = words.next().unwrap_or("");
                match tester.request_discovery(filter).await {
                    Ok(device) => println!("Name: {}", device.display_name()),
                    Err(e) => println!("Failed to pair! ({})", e),
                }
            }
            Some("paired") => match tester.list_paired().await {
                Ok(devices) => {
                    println!("{}", devices);
                    paired = devices;
                }
                Err(e) => println!("Failed to list paired devices: {}", e),
            },
            Some("use") => {
                let index = words.next().and_then(|n| n.parse::<usize>().ok());
                match index.and_then(|i| paired.devices().get(i)) {
                    Some(device) => tester.activate(device.clone()),
                    None => println!("Run `paired` and pick an index from its list"),
                }
            }
            Some("connect") => match tester.connect().await {
                Ok(()) => {
                    println!("connected!");
                    match tester.wait_for_topology().await {
                        Some(Ok(characteristics)) if !characteristics.is_empty() => {
                            println!("Characteristics:");
                            for characteristic in characteristics {
                                println!("  {}", characteristic);
                            }
                        }
                        Some(Ok(_)) => println!("No characteristics"),
                        Some(Err(e)) => println!("Failed to list characteristics: {}", e),
                        None => {}
                    }
                }
                Err(e) => println!("Failed to connect! ({})", e),
            },
            Some("disconnect") => tester.disconnect(),
            Some("scan") => {
                if let Err(e) = tester.scan_once().await {
                    println!("Scan failed: {}", e);
                }
            }
            Some("status") => println!("{}", describe(&tester.snapshot())),
            Some("quit") | Some("exit") => break,
            Some(other) => println!("Unknown command: {}", other),
            None => {}
        }
    }

    tester.disconnect();
    println!("Done!");
    Ok(())
}

fn describe(snapshot: &SessionSnapshot) -> String {
    let device = snapshot
        .device_name
        .clone()
        .or_else(|| snapshot.device_id.clone())
        .unwrap_or_else(|| "no device".to_string());

    let mut text = format!("{}: {}", device, snapshot.connection_state);
    if !snapshot.characteristics.is_empty() {
        text.push_str(&format!(" ({} characteristics)", snapshot.characteristics.len()));
    }
    for (label, error) in [
        ("pair", &snapshot.pair_error),
        ("connect", &snapshot.connect_error),
        ("characteristics", &snapshot.topology_error),
        ("scan", &snapshot.scan_error),
    ] {
        if let Some(error) = error {
            text.push_str(&format!(" [{} failed: {}]", label, error));
        }
    }
    text
}
