//! パイプライン制御モジュール
//!
//! Capture / Detection / Serial の3スレッド構成でパイプラインを制御します。
//! 共有状態はプロセス全体のシングルトンにせず、起動時に構築して
//! 各ループへ注入します（明示的DI）。

use crate::application::recovery::{RecoveryState, RecoveryStrategy};
use crate::application::runtime_state::RuntimeState;
use crate::application::stats::StatsCollector;
use crate::application::threads;
use crate::domain::{
    AppConfig, CameraConfig, CapturePort, DetectionConfig, DetectorPort, ExclusionZones,
    FrameBuffer, GenerationRecord, PersistencePort, PetriDish, PreviewPort, Rectangle,
    SegmenterPort, SerialLink, SerialSession,
};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// 3ループが共有する明示的コンテキスト
///
/// ロックはフィールド単位。各フィールドの書き手/読み手は1スレッドずつ
/// に限定されている（frame_buffer: キャプチャ→検出、session: 検出→
/// シリアル、exclusion_zones/dish_diameter_mm: 制御→検出）。
pub struct SharedState {
    /// フレームバッファ（push/averageは必ずこのロック越しに）
    pub frame_buffer: Mutex<FrameBuffer>,
    /// 除外ゾーンのリストと編集中ドラフト
    pub exclusion_zones: Mutex<ExclusionZones>,
    /// シリアルセッション（世代交代と消化）
    pub session: Mutex<SerialSession>,
    /// 同期待ちの世代レコード（検出ループが置き、シリアルループが取る）
    pub pending_record: Mutex<Option<GenerationRecord>>,
    /// 直近の検出ボックス（プレビュー合成用）
    pub last_boxes: Mutex<Vec<Rectangle>>,
    /// シャーレ直径[mm]（オペレータが実行中に変更できる）
    pub dish_diameter_mm: Mutex<f64>,
}

impl SharedState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            frame_buffer: Mutex::new(FrameBuffer::new(config.pipeline.frame_buffer_depth)),
            exclusion_zones: Mutex::new(ExclusionZones::new()),
            session: Mutex::new(SerialSession::new()),
            pending_record: Mutex::new(None),
            last_boxes: Mutex::new(Vec::new()),
            dish_diameter_mm: Mutex::new(config.dish.diameter_mm),
        }
    }
}

/// パイプライン実行コンテキスト
pub struct PipelineRunner<C, D, S, L, V, P>
where
    C: CapturePort,
    D: DetectorPort,
    S: SegmenterPort,
    L: SerialLink,
    V: PreviewPort,
    P: PersistencePort,
{
    capture: Arc<Mutex<C>>,
    detector: Arc<Mutex<D>>,
    segmenter: Arc<Mutex<S>>,
    link: Arc<Mutex<L>>,
    preview: Arc<Mutex<V>>,
    persistence: Arc<Mutex<P>>,
    shared: Arc<SharedState>,
    state: RuntimeState,
    camera_config: CameraConfig,
    detection_config: DetectionConfig,
    stats: StatsCollector,
    recovery: RecoveryState,
    dish: PetriDish,
}

impl<C, D, S, L, V, P> PipelineRunner<C, D, S, L, V, P>
where
    C: CapturePort + 'static,
    D: DetectorPort + 'static,
    S: SegmenterPort + 'static,
    L: SerialLink + 'static,
    V: PreviewPort + 'static,
    P: PersistencePort + 'static,
{
    /// 新しいPipelineRunnerを作成
    pub fn new(
        capture: C,
        detector: D,
        segmenter: S,
        link: L,
        preview: V,
        persistence: P,
        config: &AppConfig,
    ) -> Self {
        let recovery_strategy = RecoveryStrategy {
            consecutive_error_threshold: config.serial.max_consecutive_errors,
            initial_backoff: config.serial.reconnect_initial_delay(),
            max_backoff: config.serial.reconnect_max_delay(),
        };

        Self {
            capture: Arc::new(Mutex::new(capture)),
            detector: Arc::new(Mutex::new(detector)),
            segmenter: Arc::new(Mutex::new(segmenter)),
            link: Arc::new(Mutex::new(link)),
            preview: Arc::new(Mutex::new(preview)),
            persistence: Arc::new(Mutex::new(persistence)),
            shared: Arc::new(SharedState::new(config)),
            state: RuntimeState::new(),
            camera_config: config.camera.clone(),
            detection_config: config.detection.clone(),
            stats: StatsCollector::new(config.pipeline.stats_interval()),
            recovery: RecoveryState::new(recovery_strategy),
            dish: PetriDish::new(config.dish.diameter_mm),
        }
    }

    /// 3つのワーカースレッドを起動する（ノンブロッキング）
    ///
    /// 返ったハンドル経由で制御スレッドがトリガと終了を操作する。
    pub fn start(self) -> PipelineHandle {
        let (trigger_tx, trigger_rx) = bounded::<()>(1);

        tracing::info!("Starting pipeline with 3-thread architecture...");
        tracing::info!("Threads: Capture -> Detection -> Serial");

        // Capture Thread
        let capture_handle = {
            let capture = Arc::clone(&self.capture);
            let preview = Arc::clone(&self.preview);
            let shared = Arc::clone(&self.shared);
            let state = self.state.clone();
            let camera_config = self.camera_config.clone();
            std::thread::spawn(move || {
                threads::capture_thread(capture, preview, shared, state, camera_config);
            })
        };

        // Detection Thread
        let detection_handle = {
            let detector = Arc::clone(&self.detector);
            let segmenter = Arc::clone(&self.segmenter);
            let shared = Arc::clone(&self.shared);
            let state = self.state.clone();
            let config = self.detection_config.clone();
            let dish = self.dish;
            let stats = self.stats;
            std::thread::spawn(move || {
                threads::detection_thread(
                    detector, segmenter, shared, trigger_rx, state, config, dish, stats,
                );
            })
        };

        // Serial Thread
        let serial_handle = {
            let link = Arc::clone(&self.link);
            let persistence = Arc::clone(&self.persistence);
            let shared = Arc::clone(&self.shared);
            let state = self.state.clone();
            let recovery = self.recovery;
            std::thread::spawn(move || {
                threads::serial_thread(link, persistence, shared, state, recovery);
            })
        };

        PipelineHandle {
            trigger_tx: Some(trigger_tx),
            state: self.state,
            shared: self.shared,
            handles: vec![capture_handle, detection_handle, serial_handle],
        }
    }
}

/// 起動済みパイプラインへの制御ハンドル
///
/// 制御スレッド（コンソール）とテストが使う。Dropの前に
/// `request_shutdown` + `join` を呼ぶのが正規の終了手順。
pub struct PipelineHandle {
    trigger_tx: Option<Sender<()>>,
    state: RuntimeState,
    shared: Arc<SharedState>,
    handles: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// 検出周期を1回発火させる
    ///
    /// bounded(1)チャネルのため、前のトリガが未消化なら黙って潰す
    /// （検出ループはどのみち1回分しか実行しない）。
    pub fn trigger(&self) {
        let Some(tx) = &self.trigger_tx else {
            return;
        };

        match tx.try_send(()) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Trigger already pending, coalesced");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Detection thread is gone, trigger ignored");
            }
        }
    }

    /// 共有コンテキストへの参照（ゾーン編集・状態照会用）
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// 全ループへシャットダウンを要求する
    ///
    /// トリガ送信側を落とすことで、手動トリガ待ちの検出ループも
    /// recvのDisconnectedで即座に抜ける。
    pub fn request_shutdown(&mut self) {
        tracing::info!("Shutdown requested");
        self.state.request_shutdown();
        self.trigger_tx = None;
    }

    /// 3スレッドの終了を待つ
    ///
    /// カメラハンドルを含むアダプタ群はこの後に解放される
    /// （キャプチャループの書き込みとteardownの競合を避ける）。
    pub fn join(mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("All pipeline threads joined");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BinaryMask, CameraInfo, DomainResult, Frame, RawDetection, SessionState,
    };
    use std::time::Duration;

    // モック実装（pipeline起動のスモークテスト用）
    struct MockCapture;
    impl CapturePort for MockCapture {
        fn read_frame(&mut self) -> DomainResult<Frame> {
            std::thread::sleep(Duration::from_millis(1));
            Ok(Frame::filled(32, 32, [128, 128, 128]))
        }

        fn device_info(&self) -> CameraInfo {
            CameraInfo {
                width: 32,
                height: 32,
                name: "Mock Camera".to_string(),
            }
        }
    }

    struct MockSegmenter;
    impl SegmenterPort for MockSegmenter {
        fn segment(&mut self, frame: &Frame) -> DomainResult<BinaryMask> {
            // 中央の塊を前景にする
            let mut mask = BinaryMask::new_zeroed(frame.width, frame.height);
            for y in 8..24 {
                for x in 8..24 {
                    mask.set(x, y);
                }
            }
            Ok(mask)
        }
    }

    struct MockDetector;
    impl DetectorPort for MockDetector {
        fn infer(
            &mut self,
            _frame: &Frame,
            _score_threshold: f64,
        ) -> DomainResult<Vec<RawDetection>> {
            Ok(vec![RawDetection {
                x1: 10.0,
                y1: 10.0,
                x2: 14.0,
                y2: 14.0,
                score: 0.9,
                class_index: 0,
            }])
        }
    }

    struct MockLink;
    impl SerialLink for MockLink {
        fn read_line(&mut self) -> DomainResult<Option<String>> {
            std::thread::sleep(Duration::from_millis(1));
            Ok(None)
        }

        fn write_line(&mut self, _line: &str) -> DomainResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn reconnect(&mut self) -> DomainResult<()> {
            Ok(())
        }
    }

    struct MockPreview;
    impl PreviewPort for MockPreview {
        fn present(&mut self, _frame: &Frame) -> DomainResult<()> {
            Ok(())
        }
    }

    struct MockPersistence;
    impl PersistencePort for MockPersistence {
        fn save_generation(&mut self, _record: &GenerationRecord) -> DomainResult<()> {
            Ok(())
        }
    }

    fn runner(
        config: &AppConfig,
    ) -> PipelineRunner<MockCapture, MockDetector, MockSegmenter, MockLink, MockPreview, MockPersistence>
    {
        PipelineRunner::new(
            MockCapture,
            MockDetector,
            MockSegmenter,
            MockLink,
            MockPreview,
            MockPersistence,
            config,
        )
    }

    #[test]
    fn test_shared_state_defaults() {
        let config = AppConfig::default();
        let shared = SharedState::new(&config);

        assert!(shared.frame_buffer.lock().unwrap().is_empty());
        assert!(shared.exclusion_zones.lock().unwrap().is_empty());
        assert_eq!(
            shared.session.lock().unwrap().state(),
            SessionState::Idle
        );
        assert_eq!(*shared.dish_diameter_mm.lock().unwrap(), 88.0);
    }

    #[test]
    fn test_pipeline_start_trigger_and_shutdown() {
        let config = AppConfig::default();
        let mut handle = runner(&config).start();

        // キャプチャループがバッファを埋めるのを待ってからトリガ
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while handle.shared().frame_buffer.lock().unwrap().is_empty() {
            assert!(std::time::Instant::now() < deadline, "capture never produced a frame");
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.trigger();

        // 検出周期が世代を発行するまで待つ
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            {
                let session = handle.shared().session.lock().unwrap();
                if session.generation() > 0 {
                    assert_eq!(session.state(), SessionState::Armed);
                    assert_eq!(session.target_count(), 1);
                    break;
                }
            }
            assert!(std::time::Instant::now() < deadline, "generation was never published");
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.request_shutdown();
        handle.join();
    }

    #[test]
    fn test_trigger_coalesces_when_pending() {
        let config = AppConfig::default();
        let mut handle = runner(&config).start();

        // 連打してもパニックせず、保留分は潰される
        for _ in 0..10 {
            handle.trigger();
        }

        handle.request_shutdown();
        handle.join();

        // シャットダウン後のトリガも安全
        handle_post_shutdown_trigger();
    }

    fn handle_post_shutdown_trigger() {
        // request_shutdown後はtrigger_txがNoneなのでno-op
        let config = AppConfig::default();
        let mut handle = runner(&config).start();
        handle.request_shutdown();
        handle.trigger();
        handle.join();
    }
}
