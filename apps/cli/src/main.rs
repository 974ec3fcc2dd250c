use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtlbt_core::epatch::{ContainerInfo, extract_patch};
use rtlbt_core::session::{SetupConfig, SetupSession};
use rtlbt_core::transport::NusbTransport;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Realtek Bluetooth USB firmware loader", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the firmware patch into an attached controller
    Setup {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding firmware containers
        #[arg(long)]
        firmware_dir: Option<PathBuf>,

        /// USB vendor id (hex)
        #[arg(long, value_parser = parse_hex_u16, requires = "pid")]
        vid: Option<u16>,

        /// USB product id (hex)
        #[arg(long, value_parser = parse_hex_u16, requires = "vid")]
        pid: Option<u16>,

        /// Skip the device configuration (DDC) stage
        #[arg(long)]
        no_device_config: bool,
    },
    /// Print the layout of a firmware container
    Inspect {
        file: PathBuf,
    },
    /// Write the patch for one ROM version to a file
    Extract {
        file: PathBuf,

        /// ROM version as reported by the controller (decimal or 0x-prefixed)
        #[arg(long, value_parser = parse_u8)]
        rom_version: u8,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| e.to_string())
}

fn parse_u8(s: &str) -> Result<u8, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match args.command {
        Command::Setup {
            config,
            firmware_dir,
            vid,
            pid,
            no_device_config,
        } => run_setup(config, firmware_dir, vid, pid, no_device_config),
        Command::Inspect { file } => run_inspect(&file),
        Command::Extract {
            file,
            rom_version,
            output,
        } => run_extract(&file, rom_version, &output),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_setup(
    config_path: Option<PathBuf>,
    firmware_dir: Option<PathBuf>,
    vid: Option<u16>,
    pid: Option<u16>,
    no_device_config: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => SetupConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SetupConfig::default(),
    };
    if let Some(dir) = firmware_dir {
        config.firmware_dir = dir;
    }
    if vid.is_some() {
        config.vendor_id = vid;
        config.product_id = pid;
    }
    if no_device_config {
        config.load_device_config = false;
    }

    info!("Starting rtlbt (nusb backend)...");

    let transport = match config.device_ids()? {
        Some((vid, pid)) => NusbTransport::open_with_ids(vid, pid)?,
        None => NusbTransport::open()?,
    };
    let store = config.firmware_store();
    let chips = config.chip_table();

    let mut session = SetupSession::new(transport, store, chips, config);
    match session.run() {
        Ok(summary) => {
            info!(
                firmware = %summary.firmware,
                rom_version = %format!("0x{:02x}", summary.rom_version),
                patch_len = summary.patch_len,
                "Controller is running the patched firmware"
            );
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("setup failed [{}]: {}", e.reason(), e)),
    }
}

fn run_inspect(file: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let report = ContainerInfo::inspect(&data)?;
    println!("{}", report.to_text());
    Ok(())
}

fn run_extract(file: &Path, rom_version: u8, output: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let patch = extract_patch(&data, rom_version)?;
    info!(
        offset = %format!("0x{:x}", patch.offset),
        len = patch.len(),
        "Writing patch"
    );
    std::fs::write(output, patch.as_bytes())
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}
