use anyhow::Result;
use clap::Parser;
use loqa_duplex::{
    AudioBackendFactory, Character, ClientError, Config, FileTokenProvider, NatsSessionConfig,
    NatsSessionFactory, TokenProvider, VoiceClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Duplex voice client: streams the microphone to a voice service and plays
/// its replies, reconnecting and recycling audio devices as needed.
#[derive(Debug, Parser)]
#[command(name = "loqa-duplex", version)]
struct Cli {
    /// Config file (TOML, extension optional)
    #[arg(long, default_value = "config/loqa-duplex")]
    config: String,

    /// Input device id (see --list-devices)
    #[arg(long)]
    device: Option<u32>,

    /// Character to talk to
    #[arg(long, value_enum)]
    character: Option<Character>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    if let Some(character) = cli.character {
        cfg.session.character = character;
    }

    let (log_file, _log_guard) = init_tracing(&cfg)?;

    info!("Starting Loqa Duplex v{}", env!("CARGO_PKG_VERSION"));

    let result = run(cli, cfg, log_file).await;
    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    result
}

async fn run(cli: Cli, cfg: Config, log_file: Option<PathBuf>) -> Result<()> {
    let backend = AudioBackendFactory::create(&cfg.audio)?;

    let devices = backend.input_devices()?;
    info!("AVAILABLE MICROPHONES:");
    for (index, device) in devices.iter().enumerate() {
        info!("{}. Device id {} - {}", index + 1, device.id, device.name);
    }
    if cli.list_devices {
        return Ok(());
    }
    if devices.is_empty() {
        return Err(ClientError::NoInputDevices.into());
    }

    let token = FileTokenProvider::new(&cfg.auth.token_file)
        .valid_token()
        .await?;

    let character = cfg.session.character;
    info!("Selected character: {}", character);

    let factory = NatsSessionFactory::new(
        NatsSessionConfig {
            url: cfg.session.nats_url.clone(),
            subject_prefix: cfg.session.subject_prefix.clone(),
            character,
            open_timeout: cfg.session.open_timeout(),
        },
        token,
    );

    let client = VoiceClient::start(&cfg, cli.device, backend, Arc::new(factory)).await?;

    print_banner(character, log_file.as_deref());

    client
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            println!("\nShutting down...");
        })
        .await?;

    println!("Resources cleaned up. Check the log file for details.");
    Ok(())
}

/// Console plus (optionally) a timestamped log file
fn init_tracing(
    cfg: &Config,
) -> Result<(Option<PathBuf>, Option<tracing_appender::non_blocking::WorkerGuard>)> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    if !cfg.logging.file_logging {
        registry.init();
        return Ok((None, None));
    }

    std::fs::create_dir_all(&cfg.logging.directory)?;
    let file_name = format!(
        "loqa-duplex_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = cfg.logging.directory.join(&file_name);

    let appender = tracing_appender::rolling::never(&cfg.logging.directory, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    registry
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Ok((Some(path), Some(guard)))
}

fn print_banner(character: Character, log_file: Option<&std::path::Path>) {
    println!("\n{}", "=".repeat(50));
    println!("You are now connected to {}!", character);
    println!("HOW TO USE:");
    println!("1. Speak clearly into your selected microphone");
    println!("2. You'll see a visual audio level indicator when speaking");
    println!("3. The system will automatically maintain the connection");
    println!("4. Press Ctrl+C to exit");
    if let Some(path) = log_file {
        println!("5. Log file is being created at: {}", path.display());
    }
    println!("{}\n", "=".repeat(50));
}
