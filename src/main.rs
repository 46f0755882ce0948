use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;
use sds011_monitor::monitor::Monitor;
use sds011_monitor::report::{topic_for, MqttPublisher, Reporter};
use sds011_monitor::settings::{Overrides, Settings};
use sds011_monitor::{Sds011, SerialLink};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sds011-monitor")]
#[command(about = "Average SDS011 particulate readings and publish them over MQTT")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sds011-monitor.toml")]
    config: PathBuf,

    /// Serial device the sensor is attached to
    #[arg(short, long)]
    device: Option<String>,

    /// MQTT broker host
    #[arg(long)]
    host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    port: Option<u16>,

    /// Operator identity, reports are published on `<operator>/air-quality`
    #[arg(long)]
    operator: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// File log records are appended to
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            device: self.device.clone(),
            host: self.host.clone(),
            port: self.port,
            operator: self.operator.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

fn init_logging(file: &Path) -> color_eyre::Result<()> {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "sds011_monitor=info,air_quality=info".to_owned());
    let log_file = OpenOptions::new().create(true).append(true).open(file)?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let from_file = cli.config.exists();
    let mut settings = if from_file {
        Settings::load(&cli.config)?
    } else {
        Settings::default()
    };
    settings.apply(cli.overrides())?;

    init_logging(&settings.logging.file)?;
    if from_file {
        info!(path = ?cli.config, "Loaded configuration");
    } else {
        info!("No configuration file found, using defaults");
    }

    let cancel = CancellationToken::new();

    let (publisher, topic) = match &settings.mqtt {
        Some(mqtt) => {
            info!(host = %mqtt.host, port = mqtt.port, operator = %mqtt.operator, "Publishing to MQTT broker");
            let publisher = MqttPublisher::spawn(mqtt.options());
            (Some(publisher), topic_for(&mqtt.operator))
        }
        None => {
            info!("No MQTT broker configured, summaries are only logged");
            (None, String::new())
        }
    };
    let reporter = Reporter::new(publisher, topic);

    info!(device = %settings.sensor.device, "Opening sensor link");
    let link = SerialLink::open(settings.sensor.device.as_str())?;
    let sensor = Sds011::new(link, settings.sensor.driver_config());

    let mut monitor = Monitor::new(sensor, settings.sampling.sampler(), reporter)
        .stabilization(settings.sampling.stabilization())
        .interval(settings.sampling.interval())
        .confirm_awake(settings.sampling.confirm_awake);

    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                cancel_on_signal.cancel();
            }
            Err(e) => error!(error = ?e, "Failed to listen for Ctrl+C"),
        }
    });

    monitor.run(cancel).await;

    // The event loop outlives the monitor so queued reports still go out.
    if let Some(publisher) = monitor.into_reporter().into_publisher() {
        publisher.disconnect().await;
    }

    info!("sds011-monitor shut down complete");
    Ok(())
}
