use clap::Parser;
use lumiwink_core::{ChannelPublisher, LumiConfig, Publisher};
use lumiwink_orchestrator::{topics, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod stdio;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "lumiwink.toml", env = "LUMIWINK_CONFIG")]
    config: PathBuf,

    /// Run a short synthetic demo instead of reading the stdio bus
    #[arg(long)]
    demo: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Loading config from {}...", args.config.display());
    let config = LumiConfig::load_or_default(&args.config);

    let (publisher, rx) = ChannelPublisher::new();
    let publisher: Arc<dyn Publisher> = Arc::new(publisher);
    let orchestrator = Orchestrator::start(config, publisher);

    if args.demo {
        run_demo(orchestrator, rx).await
    } else {
        run_stdio(orchestrator, rx).await
    }
}

/// The synthetic conversation, printed the way a bus sniffer would show it.
async fn run_demo(
    orchestrator: Orchestrator,
    mut rx: mpsc::UnboundedReceiver<lumiwink_core::Outbound>,
) -> anyhow::Result<()> {
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let (topic, body) = lumiwink_orchestrator::Dispatcher::encode(&msg);
            println!("PUB {}: {}", topic, body);
        }
    });

    let bus = orchestrator.dispatcher();
    bus.handle(topics::AUDIO_AWAKE, b"{}").await;
    bus.handle(topics::AUDIO_STT, br#"{"text":"What's the weather?"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    bus.handle(
        topics::DIALOGUE_REPLY,
        br#"{"text":"Looks sunny with a gentle breeze."}"#,
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    bus.handle(topics::TTS_DONE, b"{}").await;
    bus.handle(topics::VISION_TARGET, br#"{"az":15.0,"el":2.0}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    orchestrator.shutdown().await;
    printer.await?;
    Ok(())
}

/// Serve the JSON-lines bus until stdin closes or Ctrl-C.
async fn run_stdio(
    orchestrator: Orchestrator,
    rx: mpsc::UnboundedReceiver<lumiwink_core::Outbound>,
) -> anyhow::Result<()> {
    let writer = tokio::spawn(stdio::drain_to_stdout(rx));

    info!("Listening on stdin for {:?}", topics::INBOUND);
    let interrupted = tokio::select! {
        res = stdio::pump_stdin(orchestrator.dispatcher()) => {
            if let Err(e) = res {
                tracing::error!("stdin bus failed: {}", e);
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            true
        }
    };

    orchestrator.shutdown().await;
    writer.await??;

    // Dropping the runtime would block on the pending stdin read
    if interrupted {
        std::process::exit(0);
    }
    Ok(())
}
