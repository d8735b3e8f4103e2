use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::time::{sleep, Duration};

use motion_sync::config::{
    ReceiverConfig, SenderConfig, SensorKind, DEFAULT_BROKER_URL,
};
use motion_sync::dashboard;
use motion_sync::distance::{DistanceConfig, RoutedConfig};
use motion_sync::live_status::spawn_status_writer;
use motion_sync::sync::{ReceiverReport, SenderReport};

#[derive(Parser, Debug)]
#[command(name = "motion_sync")]
#[command(about = "Push GPS fixes to a location broker, or poll it and derive motion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the GPS and push every fix to the broker
    Send(SendArgs),
    /// Poll the broker and estimate speed, velocity and acceleration
    Receive(ReceiveArgs),
}

#[derive(clap::Args, Debug)]
struct SendArgs {
    #[arg(long, default_value = DEFAULT_BROKER_URL)]
    broker_url: String,

    #[arg(long, value_enum, default_value = "termux")]
    sensor: SensorArg,

    #[arg(long, default_value = "1000")]
    fix_interval_millis: u64,

    /// Timeout for each broker request
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(long, value_name = "SECONDS", default_value = "0")]
    duration: u64,
}

#[derive(clap::Args, Debug)]
struct ReceiveArgs {
    #[arg(long, default_value = DEFAULT_BROKER_URL)]
    broker_url: String,

    #[arg(long, default_value = "3")]
    poll_interval_secs: u64,

    #[arg(long, value_enum, default_value = "great-circle")]
    distance: DistanceArg,

    /// OpenRouteService key, required for --distance routed
    #[arg(long, env = "ORS_API_KEY", hide_env_values = true)]
    ors_api_key: Option<String>,

    #[arg(long, default_value = "driving-car")]
    ors_profile: String,

    /// Use great-circle distance when the routing service fails
    #[arg(long)]
    degrade_to_great_circle: bool,

    /// Timeout for broker and routing requests
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Write live_status.json here on every update
    #[arg(long)]
    status_dir: Option<PathBuf>,

    /// Serve /status and /ws on this port
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(long, value_name = "SECONDS", default_value = "0")]
    duration: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SensorArg {
    Termux,
    Mock,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DistanceArg {
    GreatCircle,
    Routed,
}

impl SendArgs {
    fn config(&self) -> SenderConfig {
        SenderConfig {
            broker_url: self.broker_url.clone(),
            sensor: match self.sensor {
                SensorArg::Termux => SensorKind::Termux,
                SensorArg::Mock => SensorKind::Mock,
            },
            fix_interval: Duration::from_millis(self.fix_interval_millis),
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl ReceiveArgs {
    fn config(&self) -> ReceiverConfig {
        let timeout = Duration::from_secs(self.timeout_secs);
        let distance = match self.distance {
            DistanceArg::GreatCircle => DistanceConfig::GreatCircle,
            DistanceArg::Routed => DistanceConfig::Routed(RoutedConfig {
                api_key: self.ors_api_key.clone(),
                profile: self.ors_profile.clone(),
                timeout,
                degrade_to_great_circle: self.degrade_to_great_circle,
                ..RoutedConfig::default()
            }),
        };

        ReceiverConfig {
            broker_url: self.broker_url.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            request_timeout: timeout,
            distance,
            status_dir: self.status_dir.clone(),
            dashboard_port: self.dashboard_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Send(args) => send(args).await,
        Command::Receive(args) => receive(args).await,
    }
}

async fn send(args: SendArgs) -> Result<()> {
    let config = args.config();
    println!("[{}] Sender starting", ts_now());
    println!("  Broker: {}", config.broker_url);
    println!("  Sensor: {:?}", config.sensor);
    println!("  Fix interval: {:?}", config.fix_interval);

    let session = config.build().context("Failed to build sender")?;
    let mut reports = session.subscribe();
    session.start()?;

    let shutdown = shutdown_signal(args.duration);
    tokio::pin!(shutdown);
    let mut last_rendered = SenderReport::default();

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if report != last_rendered {
                    println!("[{}] {}", ts_now(), render_sender(&report));
                    last_rendered = report;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    session.stop()?;
    let report = session.report();
    println!("\n=== Sender Stats ===");
    println!("Fixes sent: {}", report.sent_count);
    Ok(())
}

async fn receive(args: ReceiveArgs) -> Result<()> {
    let config = args.config();
    println!("[{}] Receiver starting", ts_now());
    println!("  Broker: {}", config.broker_url);
    println!("  Poll interval: {:?}", config.poll_interval);
    println!("  Distance: {:?}", args.distance);

    let session = config.build().context("Failed to build receiver")?;

    if let Some(dir) = &config.status_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        spawn_status_writer(session.subscribe(), dir.clone());
    }

    if let Some(port) = config.dashboard_port {
        let reports = session.subscribe();
        tokio::spawn(async move {
            if let Err(e) = dashboard::start_dashboard(reports, port).await {
                log::error!("Dashboard failed: {}", e);
            }
        });
    }

    let mut reports = session.subscribe();
    session.start()?;

    let shutdown = shutdown_signal(args.duration);
    tokio::pin!(shutdown);
    let mut rendered_polls = 0;

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if report.polls != rendered_polls {
                    rendered_polls = report.polls;
                    println!("[{}] {}", ts_now(), render_receiver(&report));
                }
            }
            _ = &mut shutdown => break,
        }
    }

    session.stop()?;
    let report = session.report();
    println!("\n=== Receiver Stats ===");
    println!("Polls: {}", report.polls);
    println!("Estimates: {}", report.estimates);
    if let Some(estimate) = report.state.last_estimate {
        println!("Last speed: {:.2} m/s", estimate.speed_ms);
    }
    Ok(())
}

/// Resolves on Ctrl-C, or after `duration` seconds when non-zero.
async fn shutdown_signal(duration: u64) {
    let timer = async {
        if duration > 0 {
            sleep(Duration::from_secs(duration)).await;
            println!("[{}] Duration reached, stopping...", ts_now());
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => println!("[{}] Interrupted, stopping...", ts_now()),
        _ = timer => {}
    }
}

fn render_sender(report: &SenderReport) -> String {
    let mut out = format!("Sent {}", report.sent_count);
    if let Some(sample) = &report.last_sample {
        out.push_str(&format!(
            " | lat {:.6} lon {:.6}",
            sample.latitude(),
            sample.longitude()
        ));
        if let Some(speed) = sample.speed_hint() {
            out.push_str(&format!(" | GPS speed {:.2} m/s", speed));
        }
    }
    if let Some(error) = &report.error {
        out.push_str(&format!(" | {}", error));
    }
    out
}

fn render_receiver(report: &ReceiverReport) -> String {
    let mut lines = Vec::new();

    match &report.state.last_sample {
        Some(sample) => lines.push(format!(
            "Sample lat {:.6} lon {:.6} t={}",
            sample.latitude(),
            sample.longitude(),
            sample.timestamp()
        )),
        None => lines.push("No sample yet".to_string()),
    }

    if let Some(estimate) = &report.state.last_estimate {
        lines.push(format!(
            "  Distance {:.2} m | dt {:.2} s | Speed {:.2} m/s ({:.2} km/h)",
            estimate.distance_m,
            estimate.time_delta_s,
            estimate.speed_ms,
            estimate.speed_kmh()
        ));
        lines.push(format!(
            "  Velocity lat {:.8} deg/s lon {:.8} deg/s",
            estimate.velocity.latitude_deg_s, estimate.velocity.longitude_deg_s
        ));
        if let Some(accel) = &estimate.acceleration {
            lines.push(format!(
                "  Accel {:.6} m/s2 | lat {:.6} deg/s2 lon {:.6} deg/s2",
                accel.speed_ms2, accel.latitude_deg_s2, accel.longitude_deg_s2
            ));
        }
    }

    if let Some(error) = report.error.as_ref().filter(|e| e.is_surfaced()) {
        lines.push(format!("  Error: {}", error));
    }

    lines.join("\n")
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_sync::sync::SyncState;
    use motion_sync::types::{AccelerationComponents, VelocityComponents};
    use motion_sync::{DerivedEstimate, PositionSample, SyncError};

    #[test]
    fn test_render_receiver_decimals() {
        let report = ReceiverReport {
            state: SyncState {
                last_sample: Some(PositionSample::new(40.001, -75.0, 10_000, None).unwrap()),
                last_estimate: Some(DerivedEstimate {
                    distance_m: 111.194_93,
                    time_delta_s: 10.0,
                    speed_ms: 11.119_493,
                    velocity: VelocityComponents {
                        latitude_deg_s: 0.0001,
                        longitude_deg_s: 0.0,
                    },
                    acceleration: Some(AccelerationComponents {
                        speed_ms2: 0.5,
                        latitude_deg_s2: 0.0,
                        longitude_deg_s2: 0.0,
                    }),
                }),
                ..SyncState::default()
            },
            error: Some(SyncError::TransportFailure("down".into())),
            ..ReceiverReport::default()
        };

        let text = render_receiver(&report);
        assert!(text.contains("lat 40.001000 lon -75.000000"));
        assert!(text.contains("Distance 111.19 m | dt 10.00 s | Speed 11.12 m/s (40.03 km/h)"));
        assert!(text.contains("Velocity lat 0.00010000 deg/s lon 0.00000000 deg/s"));
        assert!(text.contains("Accel 0.500000 m/s2"));
        assert!(text.contains("Error: Transport failure: down"));
    }

    #[test]
    fn test_render_receiver_empty() {
        assert_eq!(render_receiver(&ReceiverReport::default()), "No sample yet");
    }

    #[test]
    fn test_receive_args_to_config() {
        let cli = Cli::parse_from([
            "motion_sync",
            "receive",
            "--distance",
            "routed",
            "--ors-api-key",
            "abc",
            "--degrade-to-great-circle",
            "--poll-interval-secs",
            "5",
        ]);
        let Command::Receive(args) = cli.command else {
            panic!("expected receive");
        };
        let config = args.config();

        assert_eq!(config.poll_interval, Duration::from_secs(5));
        match config.distance {
            DistanceConfig::Routed(routed) => {
                assert_eq!(routed.api_key.as_deref(), Some("abc"));
                assert!(routed.degrade_to_great_circle);
                assert_eq!(routed.profile, "driving-car");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
