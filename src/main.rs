use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    time::Duration,
};

use frame_pipe::{
    Encoder, MediaProperties, PipeError, SourceExt, engine::x264::X264Engine,
    pattern::TestPattern,
};
use tokio_util::sync::CancellationToken;

mod config;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("frame_pipe", log::LevelFilter::Debug)
        .init();
}

fn run(config: config::PipeConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let mut pattern = TestPattern::new(config.width, config.height, config.format);
    if let Some(frames) = config.frames {
        pattern = pattern.limit(frames);
    }
    let source = pattern.throttle(config.frame_rate).detect_changes(
        Duration::from_millis(config.poll_interval_ms),
        |p: MediaProperties| {
            log::info!(
                "media properties: {}x{} {} {:.1} fps",
                p.width,
                p.height,
                p.pixel_format,
                p.frame_rate
            );
        },
    );

    let encoder = Encoder::open(source, config.encoder_config(), X264Engine::open)?;
    let mut out = BufWriter::new(File::create(&config.output)?);
    let mut units = 0u64;
    let mut bytes = 0usize;

    while !cancel.is_cancelled() {
        let unit = match encoder.read() {
            Ok((unit, _)) => unit,
            Err(PipeError::EndOfStream) => break,
            Err(e) => {
                encoder.close()?;
                return Err(e.into());
            }
        };
        out.write_all(&unit.data)?;
        units += 1;
        bytes += unit.len();
        if unit.is_key {
            log::debug!("key frame at unit {}", units);
        }
        if config.key_frame_every.is_some_and(|n| n > 0 && units % n == 0) {
            encoder.controller().force_key_frame()?;
        }
    }

    encoder.close()?;
    out.flush()?;
    log::info!(
        "wrote {} units, {} bytes to {}",
        units,
        bytes,
        config.output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    frame_pipe::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;

    let path = std::env::args().nth(1);
    let config = config::load(path.as_deref().map(Path::new))?;

    let cancel = CancellationToken::new();
    let mut task = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || run(config, cancel)
    });

    tokio::select! {
        result = &mut task => result??,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            task.await??;
        },
    }

    Ok(())
}
