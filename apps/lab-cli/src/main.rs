use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use lab_control::{Executor, ExperimentBuilder, Timing};
use lab_registry::{self as registry, aeropendulum, Catalogue, CatalogueRegistry, Channel};
use lab_registry::{LabConfig, LabSystem};
use lab_registry::{MetricsHub, Operation, PostOutcome, Value};
use lab_transport::{MockConnection, MockTelemetry};

#[derive(Parser, Debug)]
#[command(
    name = "lab",
    version,
    about = "Networked lab device CLI",
    disable_help_subcommand = true
)]
struct Cli {
    /// Connection settings (YAML); defaults to the aeropendulum rig
    #[arg(long, global = true)]
    config: Option<String>,

    /// Resource catalogue (YAML) to use directly, bypassing device lookup
    #[arg(long, global = true, conflicts_with = "catalogue_dir")]
    catalogue: Option<String>,

    /// Directory of device catalogues (YAML), searched along with the built-in ones
    #[arg(long, global = true)]
    catalogue_dir: Option<String>,

    /// Device to look up in the catalogues
    #[arg(long, global = true, default_value = aeropendulum::DEVICE)]
    device: String,

    /// Device address, overrides the config file
    #[arg(long, global = true)]
    address: Option<String>,

    /// Port for both channels, overrides the config file
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Use in-process mock channels instead of the network
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the known devices
    Devices,
    /// List the catalogue's resources
    Resources,
    /// Read a resource
    Get { path: String },
    /// Write a resource
    Post { path: String, value: String },
    /// Print fresh telemetry samples of a resource at a fixed rate
    Watch {
        path: String,
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        #[arg(long, default_value_t = 10.0)]
        hz: f64,
    },
    /// Collect telemetry for a while and print Prometheus metrics
    Metrics {
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let catalogue = match &cli.catalogue {
        Some(p) => registry::load_catalogue_file(p)?,
        None => {
            let reg = load_registry(&cli)?;
            if let Commands::Devices = cli.command {
                for device in reg.devices() {
                    println!("{device}");
                }
                return Ok(());
            }
            reg.lookup(&cli.device)?.clone()
        }
    };
    match &cli.command {
        Commands::Devices => {
            println!("{}", catalogue.device);
            return Ok(());
        }
        Commands::Resources => {
            list_resources(&catalogue);
            return Ok(());
        }
        _ => {}
    }

    let config = resolve_config(&cli)?;
    let session = Session::open(&config, &catalogue, cli.mock)?;
    let res = match &cli.command {
        Commands::Devices | Commands::Resources => Ok(()),
        Commands::Get { path } => get(&session, &config, path),
        Commands::Post { path, value } => post(&session, &config, path, value),
        Commands::Watch { path, seconds, hz } => watch(&session, path, *seconds, *hz),
        Commands::Metrics { seconds } => metrics(&session, *seconds),
    };
    session.close();
    res
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_registry(cli: &Cli) -> Result<CatalogueRegistry> {
    let mut reg = CatalogueRegistry::default();
    if let Some(dir) = &cli.catalogue_dir {
        let n = registry::load_catalogues_dir(&mut reg, dir)?;
        info!(files = n, dir = %dir, "catalogues loaded");
    }
    Ok(reg)
}

fn resolve_config(cli: &Cli) -> Result<LabConfig> {
    let mut cfg = match &cli.config {
        Some(p) => registry::load_config_file(p)?,
        None => aeropendulum::config(),
    };
    if let Some(a) = &cli.address {
        cfg.address = a.clone();
    }
    if let Some(p) = cli.port {
        cfg.http_port = p;
        cfg.ws_port = p;
    }
    Ok(cfg)
}

fn list_resources(catalogue: &Catalogue) {
    println!("# {}", catalogue.device);
    for r in &catalogue.resources {
        let ops: Vec<String> = r.operations.iter().map(Operation::to_string).collect();
        let summary = r.description.lines().next().unwrap_or("");
        println!("{}\t{}\t{}\t{}", r.path, ops.join(","), r.channel, summary);
    }
}

/// A connected system plus, in mock mode, a feeder that plays synthetic
/// angle samples onto the telemetry stream.
struct Session {
    system: LabSystem,
    hub: MetricsHub,
    feeder: Option<(Arc<AtomicBool>, thread::JoinHandle<()>)>,
}

impl Session {
    fn open(config: &LabConfig, catalogue: &Catalogue, mock: bool) -> Result<Self> {
        let hub = MetricsHub::new().map_err(anyhow::Error::msg)?;
        if !mock {
            let system = LabSystem::connect(config, catalogue)
                .with_context(|| format!("connecting to {}", config.address))?;
            return Ok(Self {
                system,
                hub,
                feeder: None,
            });
        }

        let telemetry = MockTelemetry::new();
        let system = LabSystem::builder()
            .command(MockConnection::new())
            .telemetry(telemetry.clone(), config.telemetry_config()?)
            .catalogue(catalogue)
            .metrics(&hub)
            .build()?;
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || feed_angles(&telemetry, &flag));
        info!("using mock channels");
        Ok(Self {
            system,
            hub,
            feeder: Some((stop, handle)),
        })
    }

    fn close(self) {
        if let Some((stop, handle)) = self.feeder {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
        self.system.close();
    }
}

fn feed_angles(telemetry: &MockTelemetry, stop: &AtomicBool) {
    let mut raw: u32 = 0;
    let mut step: i64 = 8;
    while !stop.load(Ordering::Relaxed) {
        telemetry.push(format!("{{\"angle\":\"{}\"}}", lab_transport::to_hex(raw)));
        let next = i64::from(raw) + step;
        if !(0..=0x0400).contains(&next) {
            step = -step;
        }
        raw = u32::try_from(next.clamp(0, 0x0400)).unwrap_or(0);
        thread::sleep(Duration::from_millis(20));
    }
}

fn parse_value(s: &str) -> Value {
    s.trim()
        .parse::<f64>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::Text(s.to_string()))
}

/// Poll until `done` holds or `timeout` passes.
fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn get(session: &Session, config: &LabConfig, path: &str) -> Result<()> {
    let ep = session.system.endpoint(path)?;
    let mut value = ep.get()?;
    if ep.resource().channel == Channel::Telemetry && value.is_absent() {
        // first get opened the stream; give it one timeout to deliver
        wait_until(config.timeout()?, || ep.has_new_message());
        value = ep.get()?;
    }
    println!("{value}");
    Ok(())
}

fn post(session: &Session, config: &LabConfig, path: &str, raw: &str) -> Result<()> {
    let ep = session.system.endpoint(path)?;
    let sent_before = session.system.telemetry().map_or(0, |t| t.stats().sent);
    match ep.post(parse_value(raw))? {
        PostOutcome::Status(code) => println!("{code}"),
        PostOutcome::Queued => {
            let telemetry = session
                .system
                .telemetry()
                .context("telemetry endpoint without a telemetry channel")?;
            let sent = wait_until(config.telemetry_config()?.send_timeout, || {
                telemetry.stats().sent > sent_before
            });
            if sent {
                println!("sent");
            } else {
                warn!(path, "telemetry write not delivered before send timeout");
                anyhow::bail!("{path}: write not delivered");
            }
        }
    }
    Ok(())
}

fn watch(session: &Session, path: &str, seconds: f64, hz: f64) -> Result<()> {
    let ep = session.system.endpoint(path)?;
    let timing = Timing::new(hz, seconds, 0.0, 0.0)?;
    let mut exp = ExperimentBuilder::new(0u64)
        .before_the_loop(|_| {
            ep.get()?;
            Ok(())
        })
        .in_the_loop(|samples, tick| {
            if ep.has_new_message() {
                let v = ep.get()?;
                *samples += 1;
                println!("{:.3}\t{v}", tick.elapsed().as_secs_f64());
            }
            Ok(())
        })
        .build()?;
    let report = Executor::new(timing).with_metrics(&session.hub).run(&mut exp)?;
    info!(
        samples = *exp.state(),
        ticks = report.ticks,
        overruns = report.overruns,
        "watch finished"
    );
    Ok(())
}

fn metrics(session: &Session, seconds: f64) -> Result<()> {
    let window = Duration::try_from_secs_f64(seconds).context("invalid --seconds")?;
    if let Some(t) = session.system.telemetry() {
        // any routed telemetry read opens the stream
        if let Some(ep) = session
            .system
            .endpoints()
            .find(|e| e.resource().channel == Channel::Telemetry && e.supports(Operation::Read))
        {
            ep.get()?;
        }
        if let Err(e) = t.wait_connected(window) {
            warn!(error = %e, "telemetry stream not connected");
        }
        thread::sleep(window);
    }
    session.system.observe(&session.hub);
    print!("{}", session.hub.encode_text());
    Ok(())
}
