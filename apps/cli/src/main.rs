use anyhow::{Context, Result, bail};
use clap::Parser;
use p2load_core::session::{LoaderSession, SessionConfig};
use p2load_core::transport::SerialTransport;
use tracing::{error, info};

/// Parse a number given in decimal or `0x` hex.
fn parse_number(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Propeller 2 Serial Loader (Pure Rust)", long_about = None)]
struct Args {
    /// Serial port the target is attached to
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate for the link and the loader
    #[arg(short, long, value_parser = parse_number)]
    baud: Option<u32>,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<String>,

    /// Path to the second-stage loader binary
    #[arg(long)]
    loader: Option<String>,

    /// Path to the flash booter binary
    #[arg(long)]
    booter: Option<String>,

    /// Image to load into hub memory
    #[arg(long)]
    image: Option<String>,

    /// Hub address for --image
    #[arg(long, value_parser = parse_number, default_value = "0")]
    load_addr: u32,

    /// Start the loaded image at --load-addr
    #[arg(long)]
    start: bool,

    /// Launch on this cog with COGINIT instead of restarting cog 0
    #[arg(long, value_parser = parse_number)]
    cog: Option<u32>,

    /// Parameter passed to the started code
    #[arg(long, value_parser = parse_number, default_value = "0")]
    param: u32,

    /// Image to program into flash
    #[arg(long)]
    flash: Option<String>,

    /// Flash address for --flash
    #[arg(long, value_parser = parse_number, default_value = "0")]
    flash_addr: u32,

    /// Write the flash booter to the start of flash
    #[arg(long)]
    flash_booter: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Cog ids travel in an 8-bit field.
fn cog_id(value: u32) -> Result<u8> {
    u8::try_from(value).with_context(|| format!("cog id {} out of range", value))
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("reading config {}", path))?,
        None => SessionConfig::default(),
    };
    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(loader) = &args.loader {
        config.loader_path = Some(loader.clone());
    }
    if let Some(booter) = &args.booter {
        config.booter_path = Some(booter.clone());
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = build_config(args)?;

    let cog = args.cog.map(cog_id).transpose()?;
    let Some(port) = config.port.clone() else {
        bail!("no serial port given (--port or config)");
    };
    let Some(loader_path) = config.loader_path.clone() else {
        bail!("no loader given (--loader or config)");
    };
    let loader = std::fs::read(&loader_path).with_context(|| format!("reading loader {}", loader_path))?;

    let transport = SerialTransport::open(&port, config.baud_rate)?;
    let booter_path = config.booter_path.clone();
    let mut session = LoaderSession::new(transport, config);

    let version = session.connect(&loader)?;
    info!(version = %format!("0x{:02X}", version), "Target connected");

    if args.flash_booter {
        let Some(path) = booter_path else {
            bail!("--flash-booter needs a booter (--booter or config)");
        };
        let booter = std::fs::read(&path).with_context(|| format!("reading booter {}", path))?;
        session.flash_booter(&booter)?;
    }

    if let Some(path) = &args.flash {
        let written = session.flash_file(path, args.flash_addr)?;
        info!(bytes = written, addr = %format!("0x{:X}", args.flash_addr), "Flash written");
    }

    if let Some(path) = &args.image {
        let image = std::fs::read(path).with_context(|| format!("reading image {}", path))?;
        session.load(args.load_addr, &image)?;
        info!(bytes = image.len(), addr = %format!("0x{:X}", args.load_addr), "Image loaded");
    }

    if args.start {
        match cog {
            Some(cog) => session.cog_init(cog, args.load_addr, args.param)?,
            None => session.start(0, args.load_addr, args.param)?,
        }
    }

    Ok(())
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

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("setting default subscriber failed");
    }

    info!("Starting p2load...");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1024"), Ok(1024));
        assert_eq!(parse_number("0x8000"), Ok(0x8000));
        assert_eq!(parse_number("0XfF"), Ok(0xFF));
        assert!(parse_number("0x").is_err());
        assert!(parse_number("ten").is_err());
    }

    #[test]
    fn test_cog_id_range() {
        assert_eq!(cog_id(0).unwrap(), 0);
        assert_eq!(cog_id(0x10).unwrap(), 0x10);
        assert_eq!(cog_id(0xFF).unwrap(), 0xFF);
        assert!(cog_id(0x100).is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "p2load", "--port", "/dev/ttyUSB0", "--image", "blink.bin", "--load-addr", "0x400",
            "--start", "--cog", "2",
        ])
        .unwrap();
        assert_eq!(args.load_addr, 0x400);
        assert_eq!(args.cog, Some(2));
        assert_eq!(args.flash_addr, 0);

        let config = build_config(&args).unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate, 115_200);
    }
}
