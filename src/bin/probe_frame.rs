//! probe_frame - classify one still image and print what each stage saw.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use wildfire_watch::config::DetectorSettings;
use wildfire_watch::detect::{is_fire_score, DEFAULT_INPUT_SIZE, FIRE_SCORE_CEILING};
use wildfire_watch::{DetectionEngine, Frame};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// PNG or JPEG image to classify.
    image: PathBuf,
    /// ONNX model (requires the backend-tract feature). Without it a fixed stub score is used.
    #[arg(long, env = "FIREWATCH_MODEL_PATH", value_name = "PATH")]
    model: Option<PathBuf>,
    /// Side of the square model input.
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    input_size: u32,
    /// Model input layout is NCHW rather than NHWC.
    #[arg(long)]
    channels_first: bool,
    /// Skip the color/contour pre-filter.
    #[arg(long)]
    no_prefilter: bool,
    /// Score reported by the stub backend when no model is given.
    #[arg(long, default_value_t = 1.0)]
    stub_score: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let image = image::open(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?
        .into_rgb8();
    let frame = Frame::new(image);

    let settings = DetectorSettings {
        model_path: args.model.clone(),
        input_size: args.input_size,
        color_prefilter: !args.no_prefilter,
        channels_last: !args.channels_first,
        stub_score: args.stub_score,
    };
    let mut engine = DetectionEngine::from_settings(&settings)?;
    let report = engine.inspect(&frame)?;

    println!("image:     {} ({}x{})", args.image.display(), frame.width(), frame.height());
    println!("backend:   {} @ {}px", engine.backend_name(), engine.input_size());
    match &report.regions {
        None => println!("prefilter: disabled"),
        Some(regions) => {
            println!(
                "prefilter: {} ({} candidate regions)",
                if report.prefilter_passed { "pass" } else { "reject" },
                regions.len()
            );
            for region in regions {
                println!(
                    "  region x={} y={} w={} h={} area={:.1}",
                    region.x, region.y, region.width, region.height, region.area
                );
            }
        }
    }
    match report.score {
        Some(score) => println!(
            "score:     {:.4} (fire when <= {}; {})",
            score,
            FIRE_SCORE_CEILING,
            if is_fire_score(score) { "fire" } else { "clear" }
        ),
        None => println!("score:     not evaluated"),
    }
    println!("verdict:   {}", if report.fire { "FIRE" } else { "no fire" });
    Ok(())
}
