use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shadematch::{Config, SessionOptions, SessionStatus};
use shadematch_core::color::hex_distance;
use shadematch_core::matcher::top_match;
use shadematch_core::{rank_by_similarity, Canvas, Catalog, Product, Shade, ShadeBook, ShadeCategory};
use shadematch_hw::{Camera, StillSource, VideoSource};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "shadematch", about = "ShadeMatch lipstick matching and try-on CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank catalog products by closeness to a color
    Rank {
        /// Target color, e.g. "#C01A29"
        color: String,
        /// Number of products to show (default: configured top-N)
        #[arg(short = 'n', long)]
        top: Option<usize>,
    },
    /// RGB distance between two colors
    Distance {
        /// First color, e.g. "#C01A29"
        a: String,
        /// Second color
        b: String,
    },
    /// List try-on shades with their closest catalog product
    Shades,
    /// Print the product catalog as JSON
    Catalog,
    /// List V4L2 capture devices
    Devices,
    /// Capture one mirrored JPEG from the camera
    Snapshot {
        /// Output file
        #[arg(short, long, default_value = "snapshot.jpg")]
        output: PathBuf,
        /// Camera device (default: configured device)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Run a headless try-on session and save the composited result
    TryOn {
        /// Shade name to apply (default: Classic Red)
        #[arg(short, long)]
        shade: Option<String>,
        /// Use a still image instead of the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Frames to render before saving
        #[arg(short, long, default_value_t = 30)]
        frames: u64,
        /// Output PNG
        #[arg(short, long, default_value = "try-on.png")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Rank { color, top } => {
            let catalog = load_catalog(&config)?;
            let ranked = rank_by_similarity(&color, catalog.products(), top.unwrap_or(config.top_n));
            if ranked.is_empty() {
                println!("No products to rank.");
            }
            for (i, r) in ranked.iter().enumerate() {
                println!(
                    "{:>2}. {}  {} {} ({:?})  distance {:.2}",
                    i + 1,
                    r.product.hex,
                    r.product.brand,
                    r.product.product_name,
                    r.product.finish,
                    r.distance
                );
            }
        }
        Commands::Distance { a, b } => {
            let d = hex_distance(&a, &b);
            if d.is_finite() {
                println!("{d:.2}");
            } else {
                bail!("not a 6-digit hex color: {a:?} / {b:?}");
            }
        }
        Commands::Shades => {
            let catalog = load_catalog(&config)?;
            let book = ShadeBook::new();
            for category in [ShadeCategory::Reds, ShadeCategory::Pinks, ShadeCategory::Nudes] {
                println!("{category:?}:");
                for shade in book.by_category(category) {
                    println!("{}", shade_line(shade, catalog.products()));
                }
            }
        }
        Commands::Catalog => {
            let catalog = load_catalog(&config)?;
            println!("{}", serde_json::to_string_pretty(catalog.products())?);
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found.");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Snapshot { output, device } => {
            let device = device.unwrap_or_else(|| config.camera_device.clone());
            let quality = config.snapshot_quality;
            let jpeg = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                let mut camera = Camera::open(&device)?;
                let frame = camera.capture_frame()?;
                camera.release();
                Ok(frame.mirrored().encode_jpeg(quality)?)
            })
            .await??;
            std::fs::write(&output, &jpeg).with_context(|| format!("failed to write {}", output.display()))?;
            println!("Saved {} ({} bytes)", output.display(), jpeg.len());
        }
        Commands::TryOn {
            shade,
            image,
            frames,
            output,
        } => {
            try_on(&config, shade.as_deref(), image, frames, &output).await?;
        }
    }

    Ok(())
}

/// One `shades` listing row, with the closest catalog product when there is one.
fn shade_line(shade: &Shade, products: &[Product]) -> String {
    match top_match(&shade.color.to_hex(), products) {
        Some(best) => format!(
            "  {}  {:<12} ~ {} {} ({:.1})",
            shade.color, shade.name, best.product.brand, best.product.product_name, best.distance
        ),
        None => format!("  {}  {}", shade.color, shade.name),
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    match &config.catalog_path {
        Some(path) => Catalog::load(path).with_context(|| format!("failed to load catalog {}", path.display())),
        None => Ok(Catalog::builtin().clone()),
    }
}

async fn try_on(config: &Config, shade: Option<&str>, still: Option<PathBuf>, frames: u64, output: &Path) -> Result<()> {
    let catalog = load_catalog(config)?;
    let detector = shadematch::load_detector(config)
        .await
        .with_context(|| format!("failed to load face-mesh model {}", config.facemesh_model_path()))?;

    let canvas = Arc::new(Mutex::new(Canvas::new(0, 0)));
    let options = SessionOptions::from_config(config, catalog.products());
    let device = config.camera_device.clone();
    let open_video = move || -> Result<Box<dyn VideoSource>, shadematch_hw::CameraError> {
        match still {
            Some(path) => Ok(Box::new(StillSource::open(&path)?)),
            None => Ok(Box::new(Camera::open(&device)?)),
        }
    };
    let session = shadematch::spawn_session(open_video, detector, Arc::clone(&canvas), options);

    if let Some(name) = shade {
        session.select_shade(name)?;
    }
    println!("Shade: {}", session.selected().name);

    if let SessionStatus::Error(reason) = session
        .wait_for_status(|s| *s != SessionStatus::AwaitingCamera)
        .await?
    {
        bail!("session failed: {reason}");
    }

    while session.frames_rendered() < frames {
        if let SessionStatus::Error(reason) = session.status() {
            bail!("session failed: {reason}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The render task is gone after cancel, so the last frame and the
    // canvas come from the same cycle.
    session.cancel().await;
    let frame = session.last_frame().context("session ended before any frame was composed")?;
    tracing::info!(frames = session.frames_rendered(), shade = %session.selected().name, "try-on finished");

    let mut composed = image::DynamicImage::ImageRgb8(
        frame.to_image().context("snapshot has inconsistent dimensions")?,
    )
    .to_rgba8();
    {
        let canvas = canvas.lock().map_err(|_| anyhow::anyhow!("overlay canvas poisoned"))?;
        image::imageops::overlay(&mut composed, canvas.image(), 0, 0);
    }
    composed
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Saved {} after {} frames", output.display(), session.frames_rendered());
    Ok(())
}
