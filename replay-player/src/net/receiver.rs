// WebSocket媒体接收器
//
// 每个流描述对应一条WebSocket连接。收到的每个二进制帧解析为RTP分组后
// 交给 PacketHandler 处理；解析失败或处理失败只记录日志并跳过。
// 正常关闭（1000）进入Stopped，其余任何关闭方式都进入Error。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use async_tungstenite::tokio::connect_async;
use async_tungstenite::tungstenite::Message;
use common::{
    Executable, ExecutableState, Lifecycle, MediaType, RtpPacket, StreamDescription,
    TransportError,
};
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 正常关闭码
const CLOSE_NORMAL: u16 = 1000;

/// wss连接使用ring作为TLS加密后端
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("TLS crypto provider already installed");
        }
    });
}

/// RTP分组处理器
#[async_trait]
pub trait PacketHandler: Send + 'static {
    /// 处理器接受的媒体类型
    fn media_type(&self) -> MediaType;

    async fn process(&mut self, packet: RtpPacket) -> common::Result<()>;
}

/// 接收统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub packets: u64,
    pub bytes: u64,
    pub sequence_gaps: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    sequence_gaps: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ReceiverStats {
        ReceiverStats {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
        }
    }
}

/// 序号跟踪：只检测丢包与乱序，不做缓冲
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u16>,
}

impl SequenceTracker {
    /// 返回与上一个分组之间缺失的分组数，乱序或重复返回None
    pub fn observe(&mut self, sequence: u16) -> Option<u16> {
        let Some(last) = self.last else {
            self.last = Some(sequence);
            return Some(0);
        };

        let delta = sequence.wrapping_sub(last);
        // 差值落在后半区间视为旧分组
        if delta == 0 || delta > u16::MAX / 2 {
            return None;
        }
        self.last = Some(sequence);
        Some(delta - 1)
    }
}

pub struct MediaReceiver<H: PacketHandler> {
    lifecycle: Lifecycle,
    description: StreamDescription,
    handler: Arc<Mutex<H>>,
    stats: Arc<StatsCounters>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl<H: PacketHandler> MediaReceiver<H> {
    /// 只接受 ws/wss 传输，且媒体类型必须与处理器一致
    pub fn new(description: StreamDescription, handler: H) -> Result<Self, TransportError> {
        if !description.transport.is_websocket() {
            return Err(TransportError::UnsupportedTransport(
                description.transport.to_string(),
            ));
        }
        if description.media_type != handler.media_type() {
            return Err(TransportError::MediaTypeMismatch {
                expected: handler.media_type().to_string(),
                actual: description.media_type.to_string(),
            });
        }

        let name = format!("{}Receiver", description.media_type);
        Ok(Self {
            lifecycle: Lifecycle::new(name),
            description,
            handler: Arc::new(Mutex::new(handler)),
            stats: Arc::new(StatsCounters::default()),
            cancel: None,
            task: None,
        })
    }

    pub fn description(&self) -> &StreamDescription {
        &self.description
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats.snapshot()
    }

    pub fn handler(&self) -> Arc<Mutex<H>> {
        self.handler.clone()
    }

    /// 等待连接任务结束
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Receiver task failed: {}", e);
            }
        }
    }

    fn cancel_task(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        // 任务收到取消后自行关闭连接
        self.task.take();
    }
}

impl<H: PacketHandler> Executable for MediaReceiver<H> {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn init_internal(&mut self) -> common::Result<()> {
        debug!("Receiver for {} initialized", self.description.url);
        Ok(())
    }

    fn start_internal(&mut self) -> common::Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        install_crypto_provider();

        self.cancel_task();
        let cancel = CancellationToken::new();
        // 在状态切换到Started之前订阅，任务据此等待启动完成
        let events = self.lifecycle.subscribe();

        let connection = Connection {
            url: self.description.url.clone(),
            lifecycle: self.lifecycle.clone(),
            handler: self.handler.clone(),
            stats: self.stats.clone(),
            cancel: cancel.clone(),
        };
        self.task = Some(runtime.spawn(connection.run(events)));
        self.cancel = Some(cancel);
        Ok(())
    }

    fn stop_internal(&mut self) -> common::Result<()> {
        self.cancel_task();
        Ok(())
    }

    fn destroy_internal(&mut self) -> common::Result<()> {
        self.cancel_task();
        Ok(())
    }
}

impl<H: PacketHandler> Drop for MediaReceiver<H> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// 连接任务的上下文
struct Connection<H: PacketHandler> {
    url: String,
    lifecycle: Lifecycle,
    handler: Arc<Mutex<H>>,
    stats: Arc<StatsCounters>,
    cancel: CancellationToken,
}

enum Outcome {
    Cancelled,
    Closed,
    Failed,
}

impl<H: PacketHandler> Connection<H> {
    async fn run(self, mut events: broadcast::Receiver<common::StateChange>) {
        while self.lifecycle.state() == ExecutableState::Starting {
            if events.recv().await.is_err() {
                break;
            }
        }

        match self.receive().await {
            Outcome::Cancelled => debug!("Receiver for {} cancelled", self.url),
            Outcome::Closed => {
                info!("✓ Stream {} closed normally", self.url);
                if self.lifecycle.state() == ExecutableState::Started {
                    let stopped = self
                        .lifecycle
                        .set_state(ExecutableState::Stopping)
                        .and_then(|_| self.lifecycle.set_state(ExecutableState::Stopped));
                    if let Err(e) = stopped {
                        warn!("{}", e);
                    }
                }
            }
            Outcome::Failed => self.lifecycle.fail(),
        }
    }

    async fn receive(&self) -> Outcome {
        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return Outcome::Cancelled,
            result = connect_async(self.url.as_str()) => result,
        };

        let mut stream = match connected {
            Ok((stream, _response)) => stream,
            Err(e) => {
                error!("❌ Connect to {} failed: {}", self.url, e);
                return Outcome::Failed;
            }
        };
        info!("✓ Connected to {}", self.url);

        let mut sequence = SequenceTracker::default();
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = stream.close(None).await {
                        debug!("Close {} failed: {}", self.url, e);
                    }
                    return Outcome::Cancelled;
                }
                message = stream.next() => message,
            };

            match message {
                Some(Ok(Message::Binary(data))) => {
                    self.handle_frame(&data, &mut sequence).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|frame| u16::from(frame.code));
                    if code == Some(CLOSE_NORMAL) {
                        return Outcome::Closed;
                    }
                    error!("❌ Stream {} closed abnormally: {:?}", self.url, code);
                    return Outcome::Failed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("❌ Socket error on {}: {}", self.url, e);
                    return Outcome::Failed;
                }
                None => {
                    error!("❌ Stream {} ended without close frame", self.url);
                    return Outcome::Failed;
                }
            }
        }
    }

    async fn handle_frame(&self, data: &[u8], sequence: &mut SequenceTracker) {
        let packet = match RtpPacket::deserialize(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", self.url, e);
                return;
            }
        };

        self.stats.packets.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        match sequence.observe(packet.sequence_number) {
            Some(0) => {}
            Some(missing) => {
                self.stats.sequence_gaps.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Sequence gap on {}: {} packets missing before {}",
                    self.url, missing, packet.sequence_number
                );
            }
            None => {
                self.stats.sequence_gaps.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Out of order packet {} on {}",
                    packet.sequence_number, self.url
                );
            }
        }

        if let Err(e) = self.handler.lock().await.process(packet).await {
            warn!("Packet handler failed on {}: {}", self.url, e);
        }
    }
}
