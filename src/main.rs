mod config;
mod event_loop;
mod framebuffer;
mod palette;
mod renderer;
mod terminal;

use clap::Parser;
use config::Config;
use std::path::PathBuf;

/// A bare-console ANSI/VT terminal emulator: paints a terminal grid into a
/// Linux framebuffer and drives an interactive shell over a PTY.
#[derive(Parser, Debug)]
#[command(name = "fbterm", version)]
struct Args {
    /// Primary TTF font (positional form: `fbterm <FONT> [SIZE]`).
    positional_font: Option<PathBuf>,
    /// Font size in pixels (positional form), default 16.0.
    positional_size: Option<f64>,

    /// Primary TTF font.
    #[arg(long = "font")]
    font: Option<PathBuf>,
    /// Font size in pixels, must lie in [6, 72].
    #[arg(long = "size")]
    size: Option<f64>,
    /// Additional fallback font, repeatable (up to 3).
    #[arg(long = "fallback")]
    fallback: Vec<PathBuf>,
    /// Framebuffer device.
    #[arg(long = "fb", default_value = "/dev/fb0")]
    fb: PathBuf,
    /// TOML config path; defaults to `$XDG_CONFIG_HOME/fbterm/config.toml`.
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

const MIN_FONT_SIZE: f64 = 6.0;
const MAX_FONT_SIZE: f64 = 72.0;
const DEFAULT_FONT_SIZE: f64 = 16.0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = try_main() {
        eprintln!("fbterm: {:#}", e);
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::parse();

    let font = args
        .font
        .or(args.positional_font)
        .ok_or_else(|| anyhow::anyhow!("a primary font path is required (fbterm <FONT> [SIZE])"))?;
    let size = args.size.or(args.positional_size).unwrap_or(DEFAULT_FONT_SIZE);
    if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&size) {
        anyhow::bail!("font size {size} outside allowed range [{MIN_FONT_SIZE}, {MAX_FONT_SIZE}]");
    }

    let config = Config::load(args.config.as_deref());
    let mut fallback_fonts: Vec<PathBuf> = args.fallback;
    fallback_fonts.extend(config.fonts.fallback.iter().map(PathBuf::from));

    let palette = palette::build_palette(&config);

    event_loop::run(event_loop::Startup {
        fb_path: args.fb,
        primary_font: font,
        fallback_fonts,
        font_size_px: size,
        palette,
    })
}
