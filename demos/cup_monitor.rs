//! Live cup monitoring example
//!
//! Run with: cargo run --example cup_monitor
//!
//! Set SPLASHCUP_ADDRESS to point at your cup and RUST_LOG=debug for more detail.

use splashcup_link::{
    celsius_to_fahrenheit, ChannelNotifier, ClientConfig, ConnectionState, CupClient, Detection,
    Result, TemperatureReading, READING_DISPLAY_WINDOW,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = ClientConfig::from_env();

    println!("Cup Monitor");
    println!("===========\n");
    println!("Connecting to {}...\n", config.address);

    let (notifier, mut notifications) = ChannelNotifier::new();
    let client = CupClient::start(config, Arc::new(notifier)).await?;

    let mut detections = client.subscribe_detections();
    let mut last_reading: Option<TemperatureReading> = None;
    let mut last_message = String::new();

    // Monitor loop
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n\nExiting...");
                break;
            }
            Some(request) = notifications.recv() => {
                last_message = format!("{} {}", request.title, request.body);
            }
            Ok(detection) = detections.recv() => {
                last_message = match detection {
                    Detection::Recognized(drink) => format!("{} placed on the cup", drink.name),
                    Detection::Unrecognized { uid } => format!("Unknown tag {}", uid),
                    Detection::Cleared => "Connection lost".to_string(),
                };
            }
            _ = tokio::time::sleep(Duration::from_secs(2)) => {
                if client.connection_state() == ConnectionState::Open {
                    match client.read_temperature().await {
                        Ok(reading) => last_reading = Some(reading),
                        Err(e) => last_message = format!("Read failed: {}", e),
                    }
                }
            }
        }

        display(&client, last_reading.as_ref(), &last_message);
    }

    client.shutdown().await?;

    Ok(())
}

fn display(client: &CupClient, reading: Option<&TemperatureReading>, message: &str) {
    // Clear screen and move cursor to top
    print!("\x1B[2J\x1B[1;1H");

    println!("=== Cup Monitor ===");
    println!("Connection: {}", client.connection_state());

    match client.detected() {
        Some(drink) => println!(
            "Drink: {} (target {:.1}°C)",
            drink.name, drink.target_temperature
        ),
        None => println!("Drink: --"),
    }

    match reading.filter(|r| r.is_fresh(READING_DISPLAY_WINDOW)) {
        Some(reading) => {
            let status = client.status_of(reading);
            println!(
                "Temperature: {} ({:.1}°F) [{}]",
                reading.display(),
                celsius_to_fahrenheit(reading.value),
                status
            );
        }
        None => println!("Temperature: --"),
    }

    println!("\nDrinks:");
    println!("-------");
    for drink in client.drinks() {
        println!("  {:<12} {:5.1}°C  [{}]", drink.name, drink.target_temperature, drink.uid);
    }

    if !message.is_empty() {
        println!("\n{}", message);
    }

    println!("\nPress Ctrl+C to exit");
    let _ = std::io::stdout().flush();
}
