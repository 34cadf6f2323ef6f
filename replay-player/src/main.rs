use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use common::codec::decode_recording;
use common::{Executable, ExecutableState, MediaType, RecordedPage, RecordingHeader, StreamDescription};
use replay_player::config::{AppConfig, ConfigManager, EnvConfigOverride};
use replay_player::net::{
    ActionPacketHandler, ActionReceiver, AudioPacketHandler, AudioReceiver, ChannelAudioSink,
};
use replay_player::playback::{wait_drained, FrameTicker};
use replay_player::{
    AudioClock, PlaybackSession, StreamActionPlayer, TracingExecutor, WallClock,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// 直播结束后，时钟停止前进多久即放弃剩余动作
const DRAIN_IDLE: Duration = Duration::from_secs(2);

fn cli() -> Command {
    Command::new("replay-player")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lecture recording replay engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file, created with defaults if missing")
                .default_value("replay-player.toml")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("play")
                .about("Replay a recording file against a logging executor")
                .arg(Arg::new("file").required(true).value_name("FILE"))
                .arg(
                    Arg::new("seek-ms")
                        .long("seek-ms")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(i64))
                        .conflicts_with("seek-page"),
                )
                .arg(
                    Arg::new("seek-page")
                        .long("seek-page")
                        .value_name("PAGE")
                        .value_parser(clap::value_parser!(i32)),
                )
                .arg(
                    Arg::new("speed")
                        .long("speed")
                        .value_name("FACTOR")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("1.0"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Print the pages and actions of a recording")
                .arg(Arg::new("file").required(true).value_name("FILE"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the decoded recording as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("live")
                .about("Play a live lecture from action and audio WebSocket streams")
                .arg(Arg::new("action-url").long("action-url").value_name("URL"))
                .arg(Arg::new("audio-url").long("audio-url").value_name("URL")),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // 加载配置
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("replay-player.toml"));
    let mut manager = ConfigManager::new(config_path.clone());
    manager
        .load()
        .await
        .with_context(|| format!("Failed to load config {:?}", config_path))?;
    let mut config = manager.get_config().clone();
    EnvConfigOverride::apply_overrides(&mut config);

    // 初始化日志 - RUST_LOG 优先，其次是配置文件
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .init();

    info!("🎬 Replay player starting...");
    info!("✓ Configuration loaded from {:?}", config_path);

    match matches.subcommand() {
        Some(("play", args)) => play(&config, args).await,
        Some(("dump", args)) => dump(args).await,
        Some(("live", args)) => live(config, args).await,
        _ => Ok(()),
    }
}

async fn read_recording(args: &ArgMatches) -> Result<common::Recording> {
    let file = args
        .get_one::<String>("file")
        .context("Missing recording file")?;
    let bytes = tokio::fs::read(Path::new(file))
        .await
        .with_context(|| format!("Failed to read {}", file))?;
    let recording =
        decode_recording(&bytes).with_context(|| format!("Failed to decode {}", file))?;
    info!(
        "✓ Recording loaded: {} pages, {} actions, {} bytes audio",
        recording.pages.len(),
        recording.action_count(),
        recording.header.audio_len
    );
    Ok(recording)
}

async fn play(config: &AppConfig, args: &ArgMatches) -> Result<()> {
    let recording = read_recording(args).await?;
    let speed = args.get_one::<f64>("speed").copied().unwrap_or(1.0);
    let end_ms = recording.last_timestamp();

    let executor = TracingExecutor::new("playback");
    let stats = executor.stats();
    let mut session = PlaybackSession::new(
        recording.pages,
        Arc::new(WallClock::new(speed)),
        Box::new(executor),
        Box::new(TracingExecutor::new("static")),
        config.playback.frame_interval(),
    );

    // 翻页通知
    let mut pages = session.player().lock().await.subscribe_pages();
    tokio::spawn(async move {
        while let Ok(change) = pages.recv().await {
            info!("📄 Page {} ({}ms)", change.page_number, change.timestamp);
        }
    });

    session.start().await?;

    if let Some(time_ms) = args.get_one::<i64>("seek-ms") {
        let page = session.seek_by_time(*time_ms).await?;
        info!("✓ Seek to {}ms landed on page {}", time_ms, page);
    } else if let Some(page) = args.get_one::<i32>("seek-page") {
        if session.seek_by_page(*page).await? < 0 {
            warn!("⚠️  Page {} not found, playing from the start", page);
        }
    }

    info!("✅ Playing until {}ms at {}x speed, press Ctrl+C to stop", end_ms, speed);
    tokio::select! {
        _ = session.wait_finished() => info!("✓ Playback finished"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    session.stop().await?;
    info!("✓ {} executor calls", stats.total());
    Ok(())
}

#[derive(Serialize)]
struct DumpReport<'a> {
    header: &'a RecordingHeader,
    pages: &'a [RecordedPage],
    document_bytes: usize,
    audio_bytes: usize,
}

async fn dump(args: &ArgMatches) -> Result<()> {
    let recording = read_recording(args).await?;

    if args.get_flag("json") {
        let report = DumpReport {
            header: &recording.header,
            pages: &recording.pages,
            document_bytes: recording.document.len(),
            audio_bytes: recording.audio.len(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "version {} · {} pages · document {} bytes · audio {} bytes",
        recording.header.version,
        recording.pages.len(),
        recording.header.document_len,
        recording.header.audio_len
    );
    for page in &recording.pages {
        println!(
            "page {:>4} @ {:>8}ms  static {:>4}  playback {:>5}",
            page.page_number,
            page.timestamp,
            page.static_actions.len(),
            page.playback_actions.len()
        );
        for action in &page.playback_actions {
            println!("    {:>8}ms  {:?}", action.timestamp, action.kind);
        }
    }
    Ok(())
}

async fn live(config: AppConfig, args: &ArgMatches) -> Result<()> {
    let action_url = args
        .get_one::<String>("action-url")
        .cloned()
        .unwrap_or(config.stream.action_url);
    let audio_url = args
        .get_one::<String>("audio-url")
        .cloned()
        .unwrap_or(config.stream.audio_url);

    let action_stream = StreamDescription::from_url(MediaType::Action, action_url.clone())
        .with_context(|| format!("Unrecognized action stream URL {}", action_url))?;
    let audio_stream = StreamDescription::from_url(MediaType::Audio, audio_url.clone())
        .with_context(|| format!("Unrecognized audio stream URL {}", audio_url))?;

    // 音频时间戳驱动时钟
    let clock = AudioClock::new();
    let (audio_sink, mut audio_rx) = ChannelAudioSink::new(256);
    let audio_clock = clock.clone();
    tokio::spawn(async move {
        while let Some((timestamp, _data)) = audio_rx.recv().await {
            audio_clock.set_time_ms(i64::from(timestamp));
        }
    });

    let executor = TracingExecutor::new("live");
    let stats = executor.stats();
    let mut player = StreamActionPlayer::new(Arc::new(clock), Box::new(executor));
    player.start()?;

    let mut action_receiver =
        ActionReceiver::new(action_stream, ActionPacketHandler::new(player.sink()))?;
    let mut audio_receiver = AudioReceiver::new(audio_stream, AudioPacketHandler::new(audio_sink))?;
    let mut action_events = action_receiver.subscribe();
    action_receiver.start()?;
    audio_receiver.start()?;
    info!("✓ Receivers started: {} / {}", action_url, audio_url);

    let player = Arc::new(Mutex::new(player));
    let ticker = FrameTicker::spawn(player.clone(), config.playback.frame_interval());
    info!("✅ Live playback running, press Ctrl+C to stop");

    let wait_for_end = async {
        while let Ok(change) = action_events.recv().await {
            match change.current {
                ExecutableState::Stopped => {
                    info!("✓ Action stream ended");
                    return true;
                }
                ExecutableState::Error => {
                    error!("❌ Action stream failed");
                    return false;
                }
                _ => {}
            }
        }
        false
    };

    let ended = tokio::select! {
        ended = wait_for_end => ended,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            false
        }
    };

    if ended {
        // 已收到但未到期的动作继续按时钟执行
        let frame_interval = config.playback.frame_interval();
        let remaining = tokio::select! {
            remaining = wait_drained(&player, frame_interval, DRAIN_IDLE) => remaining,
            _ = tokio::signal::ctrl_c() => player.lock().await.pending_actions(),
        };
        if remaining > 0 {
            warn!("{} queued actions never became due", remaining);
        }
    }

    ticker.shutdown().await;
    for result in [action_receiver.destroy(), audio_receiver.destroy()] {
        if let Err(e) = result {
            warn!("Receiver shutdown failed: {}", e);
        }
    }
    player.lock().await.destroy()?;

    let received = action_receiver.stats();
    info!(
        "✓ {} action packets ({} sequence gaps), {} executor calls",
        received.packets,
        received.sequence_gaps,
        stats.total()
    );
    Ok(())
}
