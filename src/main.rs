use std::path::PathBuf;

use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tryon_bridge::api::server::serve;
use tryon_bridge::config::BridgeConfig;
use tryon_bridge::tryon::normalize::{normalize_image, NormalizeOptions, Normalized};
use tryon_bridge::tryon::request::InlineImage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("normalize-image") => {
            let config = BridgeConfig::from_env()?;
            run_normalize_image_cli(cli_args.into_iter().skip(1).collect(), config.normalize)?;
            return Ok(());
        }
        Some("check-config") => {
            let config = BridgeConfig::from_env()?;
            println!("{}", serde_json::to_string_pretty(&config.summary())?);
            return Ok(());
        }
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        Some(unknown) => {
            return Err(std::io::Error::other(format!(
                "Unknown command: {unknown}\n\nUse --help for usage."
            ))
            .into());
        }
        None => {}
    }

    let config = BridgeConfig::from_env()?;
    serve(config).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn print_usage() {
    println!(
        "Usage:\n  tryon-bridge                       Serve POST /api/tryon on TRYON_BIND\n  tryon-bridge normalize-image --input <path> --output <path> [--max-dimension <px>]\n  tryon-bridge check-config          Print the resolved configuration (keys redacted)"
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizeImageCliArgs {
    input: PathBuf,
    output: PathBuf,
    max_dimension: Option<u32>,
}

fn parse_normalize_image_args(
    args: &[String],
) -> Result<NormalizeImageCliArgs, Box<dyn std::error::Error>> {
    let mut input = None::<PathBuf>;
    let mut output = None::<PathBuf>;
    let mut max_dimension = None::<u32>;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--input" => {
                input = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--output" => {
                output = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--max-dimension" => {
                let raw = needs_value(i)?;
                let parsed = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|v| *v > 0)
                    .ok_or_else(|| {
                        std::io::Error::other(format!("Invalid --max-dimension: {raw}"))
                    })?;
                max_dimension = Some(parsed);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let input = input.ok_or_else(|| std::io::Error::other("Missing required --input"))?;
    let output = output.ok_or_else(|| std::io::Error::other("Missing required --output"))?;
    Ok(NormalizeImageCliArgs {
        input,
        output,
        max_dimension,
    })
}

fn run_normalize_image_cli(
    args: Vec<String>,
    defaults: NormalizeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_normalize_image_args(args.as_slice())?;
    let options = NormalizeOptions {
        max_dimension: parsed.max_dimension.unwrap_or(defaults.max_dimension),
        ..defaults
    };

    let bytes = std::fs::read(parsed.input.as_path())?;
    let mime = image::guess_format(bytes.as_slice())
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| String::from("application/octet-stream"));
    let input_len = bytes.len();

    let original = InlineImage::new(mime, bytes);
    let summary = match normalize_image(&original, options)? {
        Normalized::Unchanged { width, height } => {
            std::fs::write(parsed.output.as_path(), original.bytes.as_slice())?;
            json!({
                "resized": false,
                "mime": original.mime,
                "size": [width, height],
                "bytes_in": input_len,
                "bytes_out": original.bytes.len(),
            })
        }
        Normalized::Resized { image, from, to } => {
            std::fs::write(parsed.output.as_path(), image.bytes.as_slice())?;
            json!({
                "resized": true,
                "mime": image.mime,
                "from": [from.0, from.1],
                "to": [to.0, to.1],
                "bytes_in": input_len,
                "bytes_out": image.bytes.len(),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
