use clap::Parser;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use mockup_creator::config::Config;
use mockup_creator::mask;
use mockup_creator::mask_source::{MaskSource, SegmentationService};
use mockup_creator::server::{self, AppState};
use mockup_creator::{MockupError, RenderRequest, ShadingMapCompositor};

#[derive(Parser)]
#[command(
    name = "mockup-creator",
    version,
    about = "Print flat patterns onto photographed objects"
)]
struct Cli {
    /// Path to config file (built-in defaults if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Render one mockup from this photo and exit instead of serving HTTP
    #[arg(long, requires_all = ["pattern", "output"])]
    original: Option<PathBuf>,

    /// Flat pattern to print onto the photo
    #[arg(long)]
    pattern: Option<PathBuf>,

    /// Mask image (white = pattern area), or a text file holding a data URL
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Where to write the result; format follows the extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Segmentation target for the mask service when no mask is given
    #[arg(long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;

    // Initialize logging with level from config
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.settings.log_level)),
        )
        .init();

    let cancel = CancellationToken::new();
    let compositor = ShadingMapCompositor::new(config.compositor.to_config());
    let mask_source: Option<Arc<dyn MaskSource>> = match config.mask_service.clone() {
        Some(svc) => {
            tracing::info!("Mask service enabled ({})", svc.api_base);
            Some(Arc::new(SegmentationService::new(svc, cancel.clone())?))
        }
        None => None,
    };

    // Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down...");
        cancel_clone.cancel();
    });

    if let Some(ref original) = cli.original {
        return render_once(&cli, original, compositor, mask_source).await;
    }

    tracing::info!("Mockup Creator v{} starting", env!("CARGO_PKG_VERSION"));
    let state = Arc::new(AppState::new(compositor, mask_source));
    server::serve_http(
        state,
        &config.settings.bind,
        config.settings.port,
        config.settings.body_limit_bytes,
        cancel,
    )
    .await?;

    println!("\nMockup Creator stopped.");
    Ok(())
}

async fn render_once(
    cli: &Cli,
    original_path: &Path,
    compositor: ShadingMapCompositor,
    mask_source: Option<Arc<dyn MaskSource>>,
) -> anyhow::Result<()> {
    let (Some(pattern_path), Some(output)) = (cli.pattern.as_ref(), cli.output.as_ref()) else {
        anyhow::bail!("--original needs --pattern and --output");
    };
    let format = ImageFormat::from_path(output)
        .map_err(|e| anyhow::anyhow!("Unsupported output format for {}: {}", output.display(), e))?;

    let read = |path: &Path| {
        std::fs::read(path).map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
    };
    let original = read(original_path)?;
    let pattern = read(pattern_path)?;

    let mask_bytes = match (&cli.mask, &mask_source) {
        (Some(path), _) => {
            let bytes = read(path)?;
            if bytes.starts_with(b"data:") {
                mask::decode_data_url(&String::from_utf8_lossy(&bytes))?
            } else {
                bytes
            }
        }
        (None, Some(source)) => source.resolve(&original, cli.prompt.as_deref()).await?,
        (None, None) => {
            return Err(MockupError::MissingMask(
                "pass --mask or configure [mask_service]".to_string(),
            )
            .into())
        }
    };

    let started = std::time::Instant::now();
    let encoded = tokio::task::spawn_blocking(move || {
        compositor.render(&RenderRequest {
            original: &original,
            pattern: &pattern,
            mask: Some(&mask_bytes),
            format,
        })
    })
    .await??;

    std::fs::write(output, &encoded)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", output.display(), e))?;
    tracing::info!(
        "Mockup written to {} in {:?}",
        output.display(),
        started.elapsed()
    );
    println!("Mockup created: {}", output.display());
    Ok(())
}
