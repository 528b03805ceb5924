use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use ocrdoc::{
    onnx::OnnxEngine, FullText, Orientation, TextRecognizerBuilder, VerticalOrigin,
};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Recognize text in an image and print the document as JSON.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    image: PathBuf,
    #[arg(long, default_value = "models/det.onnx")]
    det: PathBuf,
    #[arg(long)]
    cls: Option<PathBuf>,
    #[arg(long, default_value = "models/rec.onnx")]
    rec: PathBuf,
    #[arg(long, default_value = "models/ppocr_keys_v1.txt")]
    keys: PathBuf,
    /// Language hint, repeatable.
    #[arg(long = "lang")]
    languages: Vec<String>,
    /// EXIF orientation of the image (1-8).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=8))]
    orientation: u8,
    #[arg(long, default_value_t = 3)]
    max_candidates: usize,
    /// Report boxes with the origin at the top-left corner.
    #[arg(long)]
    top_left: bool,
    /// Fill the document's text field with the recognized lines.
    #[arg(long)]
    full_text: bool,
    #[arg(long)]
    threads: Option<usize>,
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let image = image::open(&args.image)?;

    let mut engine = OnnxEngine::builder()
        .det_model(args.det)
        .rec_model(args.rec, args.keys);
    if let Some(cls) = args.cls {
        engine = engine.cls_model(cls);
    }
    if let Some(threads) = args.threads {
        engine = engine.threads(threads);
    }
    let engine = engine.build()?;

    let recognizer = TextRecognizerBuilder::new()
        .max_candidates(args.max_candidates)
        .vertical_origin(if args.top_left {
            VerticalOrigin::TopLeft
        } else {
            VerticalOrigin::BottomLeft
        })
        .full_text(if args.full_text {
            FullText::Joined
        } else {
            FullText::Omitted
        })
        .build(engine);

    let orientation = Orientation::from_exif(args.orientation).unwrap_or_default();
    let start = Instant::now();
    let document = recognizer
        .recognize(image, args.languages, orientation)
        .await?;
    log::debug!("Recognition took {:?}", start.elapsed());

    let json = if args.pretty {
        document.to_json_pretty()?
    } else {
        document.to_json()?
    };
    println!("{json}");
    Ok(())
}
