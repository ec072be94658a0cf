use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use bitbang_target::{DebugModule, DebugTransportModule, Hart, ProgramImage, RemoteBitbang};

/// OpenOCD Remote Bitbang target emulator for the RISC-V debug
/// specification.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Port to listen on for the Remote Bitbang connection.
    #[arg(long, default_value_t = 3335)]
    port: u16,

    /// Intel HEX program image to preload. Uploading over the bitbang
    /// protocol is painfully slow, so the image is loaded up front instead.
    image: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();

    let image = match &cli.image {
        Some(path) => bitbang_target::loader::load_image(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ProgramImage::new(),
    };

    let hart = Hart::new(image.start_address());
    let dm = DebugModule::new(hart, image);
    let dtm = DebugTransportModule::new(dm);

    let mut server = RemoteBitbang::bind(("0.0.0.0", cli.port), dtm)
        .with_context(|| format!("failed to bind port {}", cli.port))?;

    server.run().context("remote bitbang session failed")?;

    Ok(())
}
