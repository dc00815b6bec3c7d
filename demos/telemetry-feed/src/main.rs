//! Prints live telemetry and risk alerts from a dashboard backend.
//!
//! ```text
//! SKYLINK_WS_URL=ws://localhost:8000/api/v1/ws/ cargo run -p telemetry-feed -- 42
//! ```
//!
//! The optional argument is a mission id; its room is (re)joined every time
//! the connection comes up.

use skylink::prelude::*;
use skylink::telemetry::init_tracing;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), SkylinkError> {
    init_tracing("telemetry_feed=info,skylink_connection=info");

    let mission = std::env::args().nth(1);
    let client = SkylinkClient::builder()
        .config(ClientConfig::from_env()?)
        .build()?;

    let _telemetry = client.subscribe(MessageKind::TelemetryUpdate, |env| {
        info!(room = ?env.room(), data = %env.data(), "telemetry");
    });
    let _alerts = client.subscribe(MessageKind::RiskAlert, |env| {
        warn!(room = ?env.room(), data = %env.data(), "risk alert");
    });
    let _confirmed = client.subscribe(MessageKind::SubscriptionConfirmed, |env| {
        info!(room = ?env.room(), "room joined");
    });

    let mut status = client.watch_status();
    let mut diagnostics = client.diagnostics();
    client.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(state = %current.state, attempts = current.reconnect_attempts, "status");
                if current.exhausted {
                    warn!("backend unreachable, giving up");
                    break;
                }
                if current.state == ConnectionState::Connected {
                    if let Some(id) = &mission {
                        if let Err(e) = client.join_mission(id) {
                            warn!(error = %e, "could not join mission room");
                        }
                    }
                }
            }
            diagnostic = diagnostics.recv() => match diagnostic {
                Ok(d) => warn!(diagnostic = %d, "client diagnostic"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "diagnostics lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown();
    Ok(())
}
