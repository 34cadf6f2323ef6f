mod config;
mod error;
mod feed;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use common::codec::decode_recording;
use tracing::info;

use crate::error::SimulatorError;

fn cli() -> Command {
    Command::new("stream-simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Serves a lecture recording as live RTP-over-WebSocket streams")
        .arg(
            Arg::new("recording")
                .short('r')
                .long("recording")
                .value_name("FILE")
                .help("Recording file to stream"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR")
                .help("Listen address, e.g. 127.0.0.1:8090"),
        )
        .arg(
            Arg::new("audio-bytes-per-ms")
                .long("audio-bytes-per-ms")
                .value_name("BYTES")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("loop")
                .long("loop")
                .help("Restart the recording when it ends")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("📺 Stream simulator starting...");

    // 加载配置
    let matches = cli().get_matches();
    let mut config = config::Config::load()?;
    if let Some(path) = matches.get_one::<String>("recording") {
        config.recording_path = PathBuf::from(path);
    }
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.bind_address = bind.clone();
    }
    if let Some(rate) = matches.get_one::<usize>("audio-bytes-per-ms") {
        config.audio_bytes_per_ms = *rate;
    }
    if matches.get_flag("loop") {
        config.loop_playback = true;
    }
    if config.audio_packet_ms == 0 {
        return Err(SimulatorError::Config("audio packet duration must be positive".into()).into());
    }
    info!("✓ Configuration loaded");

    // 读取录像
    let path = config.recording_path.display().to_string();
    let bytes = tokio::fs::read(&config.recording_path)
        .await
        .map_err(|source| SimulatorError::Read {
            path: path.clone(),
            source,
        })?;
    let recording = decode_recording(&bytes).map_err(|source| SimulatorError::Decode {
        path: path.clone(),
        source,
    })?;
    info!(
        "✓ Recording {} loaded: {} pages, {} actions, {}ms",
        path,
        recording.pages.len(),
        recording.action_count(),
        recording.last_timestamp()
    );

    let bind_address = config.bind_address.clone();
    let app = server::create_router(server::AppState::new(recording, config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("✓ Listening on {}", listener.local_addr()?);
    info!("   ws://{}/stream/action", bind_address);
    info!("   ws://{}/stream/audio", bind_address);
    info!("✅ Stream simulator ready!");

    axum::serve(listener, app).await?;
    Ok(())
}
