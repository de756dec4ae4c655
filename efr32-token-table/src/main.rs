use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use efr32_periph::devinfo;
use efr32_periph::sync::CriticalSectionClock;
use efr32_periph::userdata::{TokenLayout, TokenStore, UserDataPage, PAGE_SIZE};

mod manifest;

use manifest::{parse_hex, to_hex, Manifest};

#[derive(Debug, Parser)]
#[command(version, about = "Build and inspect EFR32 user-data page token images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a user-data page image from a token manifest.
    Build {
        /// HJSON token manifest.
        #[arg(short, long)]
        manifest: PathBuf,
        /// Output image, always one full page.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print every token of a user-data page image.
    Dump {
        /// Page image to read.
        #[arg(short, long)]
        image: PathBuf,
        /// Manifest whose layout to use instead of the default one.
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
    /// Build a DEVINFO image from the `devinfo` section of a manifest.
    Devinfo {
        #[arg(short, long)]
        manifest: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Build { manifest, output } => build(&Manifest::load(&manifest)?, output),
        Command::Dump { image, manifest } => {
            let layout = match manifest {
                Some(path) => Manifest::load(&path)?.layout()?,
                None => TokenLayout::default(),
            };
            dump(&layout, image)
        }
        Command::Devinfo { manifest, output } => build_devinfo(&Manifest::load(&manifest)?, output),
    }
}

fn build(manifest: &Manifest, output: PathBuf) -> Result<()> {
    let layout = manifest.layout()?;
    let page = UserDataPage::new(Arc::new(CriticalSectionClock));
    let store = TokenStore::new(&page, &layout);

    for (name, value) in &manifest.tokens {
        let bytes = parse_hex(value).with_context(|| format!("token {name}"))?;
        store
            .write(name, &bytes)
            .map_err(|e| anyhow!("token {name}: {e}"))?;
        log::debug!("{name} = {}", to_hex(&bytes));
    }

    fs::write(&output, page.image()).with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {} tokens to {}", manifest.tokens.len(), output.display());
    Ok(())
}

fn dump(layout: &TokenLayout, image: PathBuf) -> Result<()> {
    let bytes = fs::read(&image).with_context(|| format!("failed to read {}", image.display()))?;
    if bytes.len() != PAGE_SIZE {
        log::warn!("{} is {} bytes, expected {}", image.display(), bytes.len(), PAGE_SIZE);
    }
    let page = UserDataPage::from_image(Arc::new(CriticalSectionClock), &bytes)
        .map_err(|e| anyhow!("{}: {e}", image.display()))?;
    let store = TokenStore::new(&page, layout);

    for token in &layout.tokens {
        let value = store.read(&token.name).map_err(|e| anyhow!("token {}: {e}", token.name))?;
        let shown = if value.iter().all(|b| *b == 0xff) {
            "erased".to_string()
        } else {
            to_hex(&value)
        };
        println!("{:<24} {:#05x} {:>3}  {}", token.name, token.offset, token.size, shown);
    }
    Ok(())
}

fn build_devinfo(manifest: &Manifest, output: PathBuf) -> Result<()> {
    let info = manifest.devinfo.clone().unwrap_or_default();
    let image = info.to_bytes();
    if !devinfo::verify(&image) {
        return Err(anyhow!("generated DEVINFO failed its own CRC check"));
    }
    fs::write(&output, &image).with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {} byte DEVINFO to {}", image.len(), output.display());
    Ok(())
}
