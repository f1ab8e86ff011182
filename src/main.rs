mod app;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use app::App;
use geonote_core::{AppError, Config, LocationError};
use geonote_geo::{Position, StartOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    geonote_core::init()?;

    if let Err(e) = run().await {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}

async fn run() -> Result<(), AppError> {
    let (config, _validation) = Config::load_validated().map_err(AppError::from_config)?;
    let app = App::create(config).await?;
    let startup = app.start().await?;

    println!("GeoNote - location and time reminders");
    println!("  Data directory: {}", app.config().storage.data_dir.display());
    println!(
        "  Missed: {}, scheduled: {}, geo monitoring: {:?}",
        startup.reconcile.missed.len(),
        startup.scheduled,
        startup.geo
    );
    match startup.geo {
        StartOutcome::PermissionDenied => {
            println!("  {}", LocationError::PermissionDenied.user_message())
        }
        StartOutcome::Unavailable => {
            println!("  {}", LocationError::ServiceUnavailable.user_message())
        }
        _ => {}
    }
    println!("\nEnter `lat,lon` to move, `press <id>` to press a notification, `quit` to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if let Some(id) = line.strip_prefix("press ") {
            app.press(id.trim());
            continue;
        }

        match parse_position(line) {
            Some(position) => {
                let receivers = app.push_position(position);
                tracing::debug!("Position sent to {} watches", receivers);
            }
            None => eprintln!("Expected `lat,lon`, got `{line}`"),
        }
    }

    app.dispose().await;
    Ok(())
}

fn parse_position(line: &str) -> Option<Position> {
    let (lat, lon) = line.split_once(',')?;
    let latitude: f64 = lat.trim().parse().ok()?;
    let longitude: f64 = lon.trim().parse().ok()?;
    Some(Position::new(latitude, longitude))
}
