use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use audioscope::{Config, CpalBackend, DeviceKind, SpectrumAnalyzer, StreamEngine};

mod render;

#[derive(Parser)]
#[command(name = "audioscope")]
#[command(about = "Terminal spectrum analyzer for audio files or a capture device")]
struct Args {
    /// Audio file to play (WAV, MP3, OGG, FLAC, M4A). Captures from the input device when omitted.
    file: Option<PathBuf>,

    /// Device index from --list-devices (default device when omitted)
    #[arg(long, short)]
    device: Option<usize>,

    /// List playback and capture devices, then exit
    #[arg(long)]
    list_devices: bool,

    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Analysis and redraw rate
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Number of spectrum columns drawn
    #[arg(long, default_value = "64")]
    columns: usize,

    /// Music volume
    #[arg(long, default_value = "1.0")]
    volume: f32,

    /// Stop after this many seconds (runs until the song ends otherwise)
    #[arg(long)]
    duration: Option<f32>,
}

const ROWS: usize = 12;

fn list_devices(engine: &StreamEngine) -> Result<()> {
    for kind in [DeviceKind::Playback, DeviceKind::Capture] {
        println!("{kind} devices:");
        for (index, device) in engine.devices(kind)?.iter().enumerate() {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("  [{index}] {}{marker}", device.name);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.fps == 0 {
        return Err(anyhow!("--fps must be greater than 0"));
    }

    let mut engine = StreamEngine::new(config.engine.clone(), Box::new(CpalBackend::new()))?;
    if args.list_devices {
        return list_devices(&engine);
    }

    match &args.file {
        Some(path) => {
            info!("Starting playback of {}", path.display());
            engine.start_playback(path, args.device)?;
        }
        None => {
            info!("Starting capture");
            engine.start_capture(args.device)?;
        }
    }
    engine.set_music_volume(args.volume);
    info!("Stream info:\n{}", engine.info());

    let mut analyzer = SpectrumAnalyzer::new(&config.analyzer)?;
    let frame_time = Duration::from_secs(1) / args.fps;
    let started = Instant::now();
    let mut last = Instant::now();
    let mut stdout = std::io::stdout();

    loop {
        std::thread::sleep(frame_time.saturating_sub(last.elapsed()));
        let now = Instant::now();
        let elapsed_msec = now.duration_since(last).as_millis().min(u128::from(u32::MAX)) as u32;
        last = now;

        analyzer.analyze(&engine, elapsed_msec);

        let columns = render::fold_columns(analyzer.result(), args.columns);
        let mut frame = String::from("\x1b[H\x1b[2J");
        frame.push_str(&render::bars(&columns, ROWS));
        frame.push_str(&render::meter("level", analyzer.level(), 5.0, args.columns.max(10)));
        frame.push('\n');
        if args.file.is_some() {
            frame.push_str(&render::meter(
                "song",
                engine.song_cursor(),
                engine.song_length(),
                args.columns.max(10),
            ));
            frame.push('\n');
        }
        frame.push_str(&format!("   max {:.2}\n", analyzer.running_max()));
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;

        if args.file.is_some() && engine.is_song_finished() {
            info!("Song finished");
            break;
        }
        if args.duration.is_some_and(|limit| started.elapsed().as_secs_f32() >= limit) {
            break;
        }
    }

    engine.close_device();
    Ok(())
}
