// 模拟直播服务
//
// 动作流和音频流各占一条WebSocket连接，按录像时间发送RTP分组，
// 录像结束后以关闭码1000关闭连接。

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use common::{Action, MediaType, Recording, RecordingHeader};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::feed::{self, ActionFeed, AudioFeed, MediaFeed};

const CLOSE_NORMAL: u16 = 1000;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }
}

/// 正在发送的流
#[derive(Debug, Clone, Serialize)]
pub struct StreamSession {
    pub id: Uuid,
    pub media_type: MediaType,
    pub started_at: DateTime<Utc>,
    pub packets_sent: u64,
}

#[derive(Clone)]
pub struct AppState {
    recording: Arc<Recording>,
    actions: Arc<Vec<Action>>,
    config: Arc<Config>,
    sessions: Arc<DashMap<Uuid, StreamSession>>,
}

impl AppState {
    pub fn new(recording: Recording, config: Config) -> Self {
        let actions = Arc::new(feed::timeline(&recording));
        Self {
            recording: Arc::new(recording),
            actions,
            config: Arc::new(config),
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn active_sessions(&self) -> Vec<StreamSession> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct PageSummary {
    pub page_number: i32,
    pub timestamp: i64,
    pub static_actions: usize,
    pub playback_actions: usize,
}

#[derive(Debug, Serialize)]
pub struct RecordingSummary {
    pub header: RecordingHeader,
    pub duration_ms: i64,
    pub action_count: usize,
    pub document_bytes: usize,
    pub audio_bytes: usize,
    pub pages: Vec<PageSummary>,
}

impl RecordingSummary {
    fn from_recording(recording: &Recording) -> Self {
        Self {
            header: recording.header,
            duration_ms: recording.last_timestamp(),
            action_count: recording.action_count(),
            document_bytes: recording.document.len(),
            audio_bytes: recording.audio.len(),
            pages: recording
                .pages
                .iter()
                .map(|page| PageSummary {
                    page_number: page.page_number,
                    timestamp: page.timestamp,
                    static_actions: page.static_actions.len(),
                    playback_actions: page.playback_actions.len(),
                })
                .collect(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 录像信息
        .route("/api/v1/recording", get(recording_summary))
        .route("/api/v1/sessions", get(list_sessions))
        // 直播流
        .route("/stream/action", get(action_stream))
        .route("/stream/audio", get(audio_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

async fn recording_summary(State(state): State<AppState>) -> Json<ApiResponse<RecordingSummary>> {
    Json(ApiResponse::success(RecordingSummary::from_recording(
        &state.recording,
    )))
}

async fn list_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<StreamSession>>> {
    Json(ApiResponse::success(state.active_sessions()))
}

async fn action_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let feed = ActionFeed::new(state.actions.clone(), state.config.loop_playback);
    ws.on_upgrade(move |socket| stream_feed(socket, feed, state))
}

async fn audio_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let feed = AudioFeed::new(
        state.recording.audio.clone(),
        state.config.audio_bytes_per_ms,
        state.config.audio_packet_ms,
        state.recording.last_timestamp(),
        state.config.loop_playback,
    );
    ws.on_upgrade(move |socket| stream_feed(socket, feed, state))
}

enum StreamEnd {
    Finished,
    ClientLeft,
}

/// 按到期时间发送分组，客户端断开时提前结束
async fn stream_feed<F: MediaFeed>(socket: WebSocket, mut feed: F, state: AppState) {
    let id = Uuid::new_v4();
    let media_type = feed.media_type();
    state.sessions.insert(
        id,
        StreamSession {
            id,
            media_type,
            started_at: Utc::now(),
            packets_sent: 0,
        },
    );
    info!("📡 {} stream {} started", media_type, id);

    let (mut sender, mut receiver) = socket.split();
    let start = Instant::now();

    let end = 'frames: loop {
        let Some(frame) = feed.next_frame() else {
            break StreamEnd::Finished;
        };

        let due = start + Duration::from_millis(frame.due_ms.max(0) as u64);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(due) => break,
                message = receiver.next() => match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'frames StreamEnd::ClientLeft,
                    Some(Ok(_)) => {}
                },
            }
        }

        let data = frame.packet.serialize().to_vec();
        if let Err(e) = sender.send(Message::Binary(data)).await {
            debug!("Send on {} stream {} failed: {}", media_type, id, e);
            break StreamEnd::ClientLeft;
        }
        if let Some(mut session) = state.sessions.get_mut(&id) {
            session.packets_sent += 1;
        }
    };

    let sent = state
        .sessions
        .remove(&id)
        .map(|(_, session)| session.packets_sent)
        .unwrap_or(0);

    match end {
        StreamEnd::Finished => {
            let close = Message::Close(Some(CloseFrame {
                code: CLOSE_NORMAL,
                reason: Cow::from("end of recording"),
            }));
            if let Err(e) = sender.send(close).await {
                warn!("Close {} stream {} failed: {}", media_type, id, e);
            }
            info!("✓ {} stream {} finished: {} packets", media_type, id, sent);
        }
        StreamEnd::ClientLeft => {
            info!("{} stream {} closed by client after {} packets", media_type, id, sent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use common::{ActionKind, RecordedPage};
    use tower::ServiceExt;

    fn sample_recording() -> Recording {
        let mut first = RecordedPage::new(0, 0);
        first.playback_actions.push(Action::new(30, ActionKind::Undo));
        let mut second = RecordedPage::new(1, 60);
        second.playback_actions.push(Action::new(90, ActionKind::Redo));

        let bytes = common::codec::encode_recording(1, &[first, second], b"pdf", &[1u8; 320]);
        common::codec::decode_recording(&bytes).unwrap()
    }

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            recording_path: "unused".into(),
            audio_bytes_per_ms: 4,
            audio_packet_ms: 20,
            loop_playback: false,
        }
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(AppState::new(sample_recording(), test_config()));
        let json = get_json(app, "/health").await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"], "OK");
    }

    #[tokio::test]
    async fn test_recording_summary() {
        let app = create_router(AppState::new(sample_recording(), test_config()));
        let json = get_json(app, "/api/v1/recording").await;

        let data = &json["data"];
        assert_eq!(data["duration_ms"], 90);
        assert_eq!(data["action_count"], 2);
        assert_eq!(data["document_bytes"], 3);
        assert_eq!(data["audio_bytes"], 320);
        assert_eq!(data["header"]["version"], 1);
        assert_eq!(data["pages"][1]["timestamp"], 60);
        assert_eq!(data["pages"][1]["playback_actions"], 1);
    }

    #[tokio::test]
    async fn test_no_sessions_when_idle() {
        let app = create_router(AppState::new(sample_recording(), test_config()));
        let json = get_json(app, "/api/v1/sessions").await;
        assert_eq!(json["data"], serde_json::json!([]));
    }

    async fn wait_for_end(receiver_events: tokio::sync::broadcast::Receiver<common::StateChange>) -> common::ExecutableState {
        let mut events = receiver_events;
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                match events.recv().await {
                    Ok(change)
                        if matches!(
                            change.current,
                            common::ExecutableState::Stopped | common::ExecutableState::Error
                        ) =>
                    {
                        return change.current
                    }
                    Ok(_) => {}
                    Err(_) => return common::ExecutableState::Error,
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_live_streams_reach_replay_player() {
        use common::{ActionType, Executable, ExecutableState, StreamDescription};
        use replay_player::executor::ExecutorCall;
        use replay_player::net::{
            ActionPacketHandler, ActionReceiver, AudioPacketHandler, AudioReceiver,
            ChannelAudioSink,
        };
        use replay_player::{ActionPlayer, ManualClock, RecordingExecutor, StreamActionPlayer};

        let state = AppState::new(sample_recording(), test_config());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let clock = ManualClock::new(0);
        let calls = RecordingExecutor::new();
        let mut player = StreamActionPlayer::new(Arc::new(clock.clone()), Box::new(calls.clone()));
        player.start().unwrap();

        let action_stream = StreamDescription::from_url(
            MediaType::Action,
            format!("ws://{}/stream/action", addr),
        )
        .unwrap();
        let audio_stream =
            StreamDescription::from_url(MediaType::Audio, format!("ws://{}/stream/audio", addr))
                .unwrap();

        let (sink, mut audio_rx) = ChannelAudioSink::new(64);
        let mut action_receiver =
            ActionReceiver::new(action_stream, ActionPacketHandler::new(player.sink())).unwrap();
        let mut audio_receiver =
            AudioReceiver::new(audio_stream, AudioPacketHandler::new(sink)).unwrap();
        let action_events = action_receiver.subscribe();
        let audio_events = audio_receiver.subscribe();
        action_receiver.start().unwrap();
        audio_receiver.start().unwrap();

        assert_eq!(wait_for_end(action_events).await, ExecutableState::Stopped);
        assert_eq!(wait_for_end(audio_events).await, ExecutableState::Stopped);
        assert_eq!(action_receiver.stats().packets, 4);
        assert_eq!(audio_receiver.stats().packets, 5);
        assert_eq!(audio_receiver.stats().sequence_gaps, 0);

        let mut audio_bytes = 0;
        while let Ok((_, data)) = audio_rx.try_recv() {
            audio_bytes += data.len();
        }
        assert_eq!(audio_bytes, 320);

        clock.set(1000);
        assert_eq!(player.tick().unwrap(), 4);
        assert_eq!(
            calls.calls(),
            vec![
                ExecutorCall::PageNumber(0),
                ExecutorCall::SelectAndExecuteTool(ActionType::Undo),
                ExecutorCall::PageNumber(1),
                ExecutorCall::SelectAndExecuteTool(ActionType::Redo),
            ]
        );
        assert!(state.active_sessions().is_empty());
    }
}
