use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use stampline::{
    BatchExporter, BatchItem, Config, ItemOutcome, startup_checks,
    time_format::display_time,
    watermark::{ExportFormat, PositionAnchor, RenderTarget, TextAlign, build_lines, resolve},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "stampline.toml", global = true)]
    config: PathBuf,

    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watermark a batch of images
    Render {
        /// Source images, processed in the given order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Output directory (overrides [export].output_directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// jpeg, png or webp
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Encoder quality, 0.0 to 1.0
        #[arg(short, long)]
        quality: Option<f32>,

        #[arg(long)]
        position: Option<PositionAnchor>,

        #[arg(long)]
        align: Option<TextAlign>,

        #[arg(long)]
        scale: Option<f32>,

        /// Construction area line
        #[arg(long)]
        area: Option<String>,

        /// Construction content line
        #[arg(long)]
        content: Option<String>,

        /// Logo image drawn above the text
        #[arg(long)]
        logo: Option<PathBuf>,
    },

    /// Print the resolved watermark geometry for an image size as JSON
    Layout { width: u32, height: u32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging first
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Render {
            images,
            output,
            format,
            quality,
            position,
            align,
            scale,
            area,
            content,
            logo,
        } => {
            let watermark = &mut config.watermark;
            if let Some(format) = format {
                watermark.export_format = format;
            }
            if let Some(quality) = quality {
                watermark.export_quality = quality;
            }
            if let Some(position) = position {
                watermark.position = position;
            }
            if let Some(align) = align {
                watermark.text_align = align;
            }
            if let Some(scale) = scale {
                watermark.scale = scale;
            }
            if let Some(area) = area {
                watermark.area = area;
            }
            if let Some(content) = content {
                watermark.content = content;
            }
            if logo.is_some() {
                watermark.logo = logo;
            }
            if let Some(output) = output {
                config.export.output_directory = output;
            }
            run_render(config, images).await
        }
        Commands::Layout { width, height } => print_layout(&config, width, height),
    }
}

async fn run_render(config: Config, images: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match startup_checks::perform_startup_checks(&config).await {
        Ok(()) => {}
        Err(errors) => {
            for error in &errors {
                error!("Startup check failed: {}", error);
            }
            if errors.iter().any(|e| e.is_critical()) {
                error!("Critical startup check failed, exiting");
                return Err("Critical startup check failed".into());
            }
            warn!("Non-critical startup checks failed, continuing");
        }
    }

    let fonts = config.font_book();
    let face = fonts
        .face_for(&config.watermark.font_family)
        .ok_or("No usable font registered")?;
    info!("Drawing text with font '{}'", face.family());

    let mut items = Vec::with_capacity(images.len());
    let mut unreadable = Vec::new();
    for path in &images {
        match BatchItem::read(path).await {
            Ok(item) => items.push(item),
            Err(e) => {
                error!("Failed to read {:?}: {}", path, e);
                unreadable.push((path.clone(), e));
            }
        }
    }

    let mut exporter =
        BatchExporter::new(config.watermark.clone(), face, config.export.batch_options())?;
    exporter.load_configured_logo().await;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received (Ctrl+C), stopping after the current image");
            on_ctrl_c.cancel();
        }
    });

    let report = exporter.run(items, &cancel).await;

    for (path, e) in &unreadable {
        println!("FAILED  {}: {}", path.display(), e);
    }
    for ItemOutcome { name, result, .. } in &report.outcomes {
        match result {
            Ok(rendered) => match &rendered.written_to {
                Some(path) => println!("OK      {} -> {}", name, path.display()),
                None => println!("OK      {} -> {}", name, rendered.filename),
            },
            Err(e) => println!("FAILED  {}: {}", name, e),
        }
    }
    if report.cancelled {
        println!("Cancelled");
    }
    println!(
        "{} of {} images exported",
        report.succeeded(),
        images.len()
    );

    Ok(())
}

fn print_layout(config: &Config, width: u32, height: u32) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let fonts = config.font_book();
    let face = fonts
        .face_for(&config.watermark.font_family)
        .ok_or("No usable font registered")?;

    let logo_size = match &config.watermark.logo {
        Some(path) => match image::image_dimensions(path) {
            Ok(size) => Some(size),
            Err(e) => {
                warn!("Ignoring logo {:?}: {}", path, e);
                None
            }
        },
        None => None,
    };

    let time = display_time(&config.watermark, None);
    let lines = build_lines(&config.watermark, &time);
    let layout = resolve(
        RenderTarget::new(width, height),
        &config.watermark,
        &lines,
        logo_size,
        face.as_ref(),
    );

    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}
