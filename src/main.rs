mod ai_client;
mod config;
mod currency;
mod errors;
mod export;
mod line_item;
mod notice;
mod ocr;
mod parse_server;
mod session;
mod shell;
mod store;
mod table;
mod text_gen;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::ExtractionClient;
use config::Config;
use ocr::{ImageInput, OcrWindow, TesseractEngine};
use session::Session;
use store::SqliteStore;
use table::ShipmentTable;
use text_gen::HfTextGenerator;

#[derive(Parser)]
#[command(name = "shipment-costing", version, about = "Shipment costing table with AI and OCR intake")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "shipment_costing.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive costing session (default)
    Shell,
    /// Serve the extraction endpoint
    Serve,
    /// Ping the extraction endpoint on an interval
    KeepWarm {
        /// Ping once and exit
        #[arg(long)]
        once: bool,
    },
    /// Export the saved table to CSV
    Export {
        /// Output directory, overrides the config
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Recognize text in an image and print it
    Ocr { image: PathBuf },
}

fn open_table(cfg: &Config) -> Result<ShipmentTable, Box<dyn std::error::Error>> {
    let store = SqliteStore::open_or_in_memory(&cfg.storage.db_path, &cfg.storage.key)?;
    let mut table = ShipmentTable::new(Box::new(store));
    let rows = table.restore();
    info!(db = %cfg.storage.db_path, rows, "Table restored");
    Ok(table)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load_or_default(&args.config)?;

    match args.command.unwrap_or(Command::Shell) {
        Command::Shell => {
            let table = open_table(&cfg)?;
            let client = ExtractionClient::new(&cfg.extraction.endpoint);
            let mut session = Session::new(table, Arc::new(client));
            shell::run(&mut session, &cfg).await?;
        }
        Command::Serve => {
            let generator = HfTextGenerator::from_config(&cfg.inference);
            parse_server::serve(&cfg.server, Arc::new(generator)).await?;
        }
        Command::KeepWarm { once } => {
            let client = ExtractionClient::new(&cfg.extraction.endpoint);
            if once {
                let reply = client.ping().await?;
                println!("{}", reply.trim());
            } else {
                ai_client::keep_warm(&client, Duration::from_secs(cfg.extraction.keep_warm_secs)).await;
            }
        }
        Command::Export { dir } => {
            let table = open_table(&cfg)?;
            let dir = dir.unwrap_or_else(|| PathBuf::from(&cfg.export.dir));
            let path = export::export_to_dir(&table, &dir, &cfg.export.file_prefix)?;
            info!(path = %path.display(), rows = table.len(), "Exported");
            println!("{}", path.display());
        }
        Command::Ocr { image } => {
            let input = ImageInput::from_path(&image).await?;
            let engine = Arc::new(TesseractEngine::from_config(&cfg.ocr));
            let (opener, _inbox) = tokio::sync::oneshot::channel();
            let (mut window, mut notices) =
                OcrWindow::open(engine, opener, Duration::from_millis(cfg.ocr.close_delay_ms));
            window.wait_until_ready().await?;
            let text = window.recognize(input).await?.to_string();
            while let Ok(notice) = notices.try_recv() {
                if notice.is_error() {
                    warn!(message = %notice.message, "OCR");
                }
            }
            println!("{}", text.trim());
        }
    }

    Ok(())
}
