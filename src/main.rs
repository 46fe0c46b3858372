//! Command line entry point.
//!
//! framedex probe <media> [config.toml]
//! framedex thumbnail <media> <ms> <out.png>

use anyhow::{bail, Context, Result};

use framedex::core::logging;
use framedex::EngineConfig;

const USAGE: &str = "usage:\n  framedex probe <media> [config.toml]\n  framedex thumbnail <media> <ms> <out.png>";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match (args.first().map(String::as_str), args.get(2)) {
        (Some("probe"), Some(path)) => {
            EngineConfig::load(path).with_context(|| format!("loading config {}", path))?
        }
        _ => EngineConfig::default(),
    };
    logging::init(&config.log_filter);

    match args.first().map(String::as_str) {
        Some("probe") if args.len() >= 2 => backend::probe(&args[1], &config),
        Some("thumbnail") if args.len() == 4 => {
            let at_ms: f64 = args[2].parse().with_context(|| format!("invalid time {}", args[2]))?;
            backend::thumbnail(&args[1], at_ms, &args[3])
        }
        _ => bail!("{}", USAGE),
    }
}

#[cfg(feature = "ffmpeg")]
mod backend {
    use std::sync::Arc;

    use anyhow::Result;

    use framedex::core::time::format_millis;
    use framedex::media::FfmpegSource;
    use framedex::{CancelToken, EngineConfig, EventSink, MediaLocation, ThumbnailTool, Video};

    const THUMBNAIL_SIZE: u32 = 320;

    pub fn probe(media: &str, config: &EngineConfig) -> Result<()> {
        let source = Arc::new(FfmpegSource::new()?);
        let location = MediaLocation::parse(media);
        let video = Video::open(source, &location, config, EventSink::disabled(), CancelToken::new())?;

        let stream = video.stream();
        println!("{}", location);
        println!(
            "  stream {}: {} {}x{} {:?}",
            stream.index(),
            stream.stream_info.codec_name,
            stream.width,
            stream.height,
            stream.pixel_layout
        );
        println!("  frames: {}", video.frame_count());
        println!("  leading incomplete: {}", video.index().leading_incomplete());
        println!("  duration: {}", format_millis(video.duration_ms()));
        for (n, start) in video.index().start_times().iter().enumerate() {
            println!("  {:>6} {:>12.3} ms", n, start);
        }
        Ok(())
    }

    pub fn thumbnail(media: &str, at_ms: f64, out: &str) -> Result<()> {
        let source = Arc::new(FfmpegSource::new()?);
        let tool = ThumbnailTool::new(source, THUMBNAIL_SIZE, THUMBNAIL_SIZE);
        tool.write_png(&MediaLocation::parse(media), at_ms, out)?;
        println!("wrote {}", out);
        Ok(())
    }
}

#[cfg(not(feature = "ffmpeg"))]
mod backend {
    use anyhow::{bail, Result};

    use framedex::EngineConfig;

    const NO_BACKEND: &str = "no decoder back end compiled in; rebuild with --features ffmpeg";

    pub fn probe(_media: &str, _config: &EngineConfig) -> Result<()> {
        bail!(NO_BACKEND)
    }

    pub fn thumbnail(_media: &str, _at_ms: f64, _out: &str) -> Result<()> {
        bail!(NO_BACKEND)
    }
}
