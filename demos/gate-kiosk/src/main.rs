//! Gate kiosk
//!
//! Runs a check-in scan session in the terminal. Typed lines stand in for
//! QR codes held up to the camera; confirmations go to the configured
//! attendance API.
//!
//! # Usage
//!
//! ```bash
//! CHECKIN_API_BASE_URL=http://localhost:8080/api cargo run --bin gate-kiosk
//! ```
//!
//! Commands: `/start`, `/stop`, `/retry`, `/manual <code>`, `/resize <w> <h>`,
//! `/rotate <w> <h>`, `/status`, `/quit`. Anything else is scanned.

mod terminal;

use std::sync::Arc;
use terminal::{TerminalCamera, TerminalSurface};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_checkin::{
    HttpAttendanceApi, ScanAction, ScanEnvironment, ScanSessionStore, ScanStatus, ScannerConfig,
};
use turnstile_core::environment::SystemClock;

type Kiosk = ScanSessionStore<TerminalCamera, TerminalSurface, HttpAttendanceApi>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gate_kiosk=info,turnstile_checkin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ScannerConfig::from_env();
    tracing::info!(
        api = %config.api.base_url,
        auto_resume_ms = config.auto_resume_ms,
        restart_debounce_ms = config.restart_debounce_ms,
        "Configuration loaded"
    );

    let camera = TerminalCamera::default();
    let surface = TerminalSurface::new(1280.0, 720.0, false);
    let api = HttpAttendanceApi::new(&config.api.base_url, config.api.token.clone());
    let env = ScanEnvironment::new(
        Arc::new(SystemClock),
        camera.clone(),
        surface.clone(),
        api,
        config,
    );

    let kiosk = ScanSessionStore::new(env);
    tokio::spawn(report(kiosk.subscribe()));

    kiosk.surface_mounted().await?;
    kiosk.start().await?;

    println!("=== Gate kiosk ===");
    println!("Type a QR payload to scan it, /help for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        if !handle(&kiosk, &camera, &surface, line.trim()).await? {
            break;
        }
    }

    tracing::info!("Shutting down gracefully...");
    if let Err(error) = kiosk.teardown().await {
        tracing::warn!(%error, "Teardown incomplete");
    }
    Ok(())
}

/// Run one operator command. Returns `false` to quit.
async fn handle(
    kiosk: &Kiosk,
    camera: &TerminalCamera,
    surface: &TerminalSurface,
    line: &str,
) -> anyhow::Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

    match command {
        "" => {},
        "/quit" => return Ok(false),
        "/help" => {
            println!("/start /stop /retry /status /quit");
            println!("/manual <code>     confirm a typed code");
            println!("/resize <w> <h>    resize the preview");
            println!("/rotate <w> <h>    rotate the device to a new size");
        },
        "/start" => {
            kiosk.start().await?;
        },
        "/stop" => {
            kiosk.stop().await?;
        },
        "/retry" => {
            kiosk.retry().await?;
        },
        "/status" => {
            let session = kiosk.snapshot().await;
            println!("status: {:?}", session.status());
            if let Some(qr_box) = session.qr_box {
                println!("scan box: {}x{}", qr_box.width, qr_box.height);
            }
            if let Some(result) = session.last_result {
                println!("last result: {}", result.message);
            }
        },
        "/manual" => {
            kiosk.submit_manual_entry(rest).await?;
        },
        "/resize" | "/rotate" => {
            let Some((width, height)) = parse_size(rest) else {
                println!("usage: {command} <width> <height>");
                return Ok(true);
            };
            surface.resize(width, height);
            if command == "/rotate" {
                kiosk.orientation_changed().await?;
            } else {
                kiosk.window_resized().await?;
            }
        },
        other if other.starts_with('/') => println!("unknown command {other}"),
        _ => {
            if !camera.present(line) {
                let status = kiosk.status().await;
                if status == ScanStatus::Resolving {
                    println!("busy, wait for the current check-in");
                } else {
                    println!("camera is not scanning ({status:?}), try /start");
                }
            }
        },
    }

    Ok(true)
}

fn parse_size(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

/// Print what the session reports back.
async fn report(mut actions: broadcast::Receiver<ScanAction>) {
    loop {
        match actions.recv().await {
            Ok(ScanAction::CameraAcquired { camera, .. }) => {
                println!(
                    "camera ready, scan box {}x{}",
                    camera.qr_box.width, camera.qr_box.height
                );
            },
            Ok(ScanAction::CameraAcquireFailed { error, .. }) => {
                println!("camera unavailable: {error} (use /retry)");
            },
            Ok(ScanAction::ConfirmationCompleted { result, .. }) => {
                let mark = if result.success { "OK " } else { "ERR" };
                println!("[{mark}] {}", result.message);
            },
            Ok(ScanAction::ScanRejected { result }) => println!("[ERR] {}", result.message),
            Ok(ScanAction::ResumeScanning { .. }) => println!("ready for the next attendee"),
            Ok(_) => {},
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Result printer lagged");
            },
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
