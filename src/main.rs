use colony_picker::application::console;
use colony_picker::application::pipeline::PipelineRunner;
use colony_picker::domain::{AppConfig, PersistencePort, SerialLink};
use colony_picker::infrastructure::mock_capture::MockCaptureAdapter;
use colony_picker::infrastructure::mock_comm::MockSerialAdapter;
use colony_picker::infrastructure::mock_vision::{MockDetectorAdapter, MockSegmenterAdapter};
use colony_picker::infrastructure::persistence::{FilePersistenceAdapter, NullPersistenceAdapter};
use colony_picker::infrastructure::preview::NullPreviewAdapter;
use colony_picker::infrastructure::serial_comm::{self, SerialCommAdapter};
use colony_picker::logging::init_logging;
use std::path::PathBuf;

/// モックセグメンタの輝度閾値（明背景・暗シャーレの前提）
const SEGMENTER_THRESHOLD: u8 = 200;

fn main() {
    // ログシステムの初期化（非同期ファイル出力）
    let log_dir = PathBuf::from("logs");
    let _guard = init_logging("info", false, Some(log_dir));
    // 注意: _guardはmain終了まで保持する必要がある（Dropでログスレッドが終了）

    tracing::info!("colony-picker starting...");

    match run() {
        Ok(_) => {
            tracing::info!("colony-picker terminated gracefully.");
        }
        Err(e) => {
            tracing::error!("Fatal error: {:?}", e);
            std::process::exit(1);
        }
    }
}

/// アプリケーションのメイン処理
fn run() -> anyhow::Result<()> {
    // 設定ファイルの読み込み（存在しない場合はデフォルト設定を使用）
    let config = match AppConfig::from_file("config.toml") {
        Ok(config) => {
            tracing::info!("Loaded configuration from config.toml");
            config
        }
        Err(e) => {
            tracing::warn!("Failed to load config.toml: {}, using defaults", e);
            AppConfig::default()
        }
    };

    // 設定の検証
    config.validate()?;

    tracing::info!("Configuration validated successfully");
    tracing::info!(
        "Camera: index={}, working resolution {}x{} @ {}Hz",
        config.camera.index,
        config.camera.frame_width,
        config.camera.frame_height,
        config.camera.display_rate_hz
    );
    tracing::info!(
        "Detection: threshold={}, cycle rate={}Hz, auto_trigger={}",
        config.detection.score_threshold,
        config.detection.cycle_rate_hz,
        config.detection.auto_trigger
    );
    tracing::info!("Dish: diameter={}mm", config.dish.diameter_mm);

    // 使えるシリアルポートを起動時に列挙しておく（設定の手がかり）
    let ports = serial_comm::available_ports();
    if ports.is_empty() {
        tracing::info!("No serial ports detected");
    } else {
        tracing::info!("Available serial ports: {}", ports.join(", "));
    }

    // カメラ・検出・セグメンテーションはコラボレータ。
    // 実アダプタが用意できるまで合成シーンのモックで運転する。
    tracing::info!("Initializing mock capture adapter...");
    let capture = MockCaptureAdapter::with_resolution(
        config.camera.frame_width,
        config.camera.frame_height,
    );

    tracing::info!("Initializing mock detector / segmenter adapters...");
    let detector = MockDetectorAdapter::new();
    let segmenter = MockSegmenterAdapter::new(SEGMENTER_THRESHOLD);

    // シリアルリンク: ポート未設定なら装置なし運転
    let link: Box<dyn SerialLink> = match &config.serial.port {
        Some(path) => {
            tracing::info!("Initializing serial adapter on {}...", path);
            Box::new(SerialCommAdapter::new(
                path,
                config.serial.baud_rate,
                config.serial.read_timeout(),
                config.serial.write_timeout(),
            )?)
        }
        None => {
            tracing::info!("No serial port configured, using mock link");
            Box::new(MockSerialAdapter::new())
        }
    };

    let persistence: Box<dyn PersistencePort> = if config.persistence.enabled {
        Box::new(FilePersistenceAdapter::new(
            config.persistence.output_dir.clone(),
        ))
    } else {
        Box::new(NullPersistenceAdapter::new())
    };

    let preview = NullPreviewAdapter::new();

    // パイプラインの起動（3ワーカースレッド）。制御スレッドである
    // このスレッドはオペレータコンソールを回す。
    let runner = PipelineRunner::new(
        capture,
        detector,
        segmenter,
        link,
        preview,
        persistence,
        &config,
    );
    let mut handle = runner.start();

    console::run(&handle)?;

    // 3ループをすべてjoinしてからアダプタ（カメラハンドル含む）を
    // 解放する。キャプチャループの書き込みとteardownを競合させない。
    handle.request_shutdown();
    handle.join();

    Ok(())
}
