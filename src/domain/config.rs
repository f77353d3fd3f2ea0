//! 設定管理
//!
//! TOML設定ファイルの読み込みとDomain型への変換。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::{DomainError, DomainResult};

/// アプリケーション設定のルート構造
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// カメラ設定
    pub camera: CameraConfig,
    /// 検出設定
    pub detection: DetectionConfig,
    /// シャーレ設定
    pub dish: DishConfig,
    /// シリアル通信設定
    pub serial: SerialConfig,
    /// パイプライン設定
    pub pipeline: PipelineConfig,
    /// 世代レコードの保存設定
    pub persistence: PersistenceConfig,
}

/// カメラ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CameraConfig {
    /// カメラデバイスのインデックス
    ///
    /// 通常は0
    pub index: u32,

    /// 作業解像度の幅（ピクセル）
    ///
    /// ネイティブフレームはこのサイズへ中央切り出しされる
    /// デフォルト: 640
    pub frame_width: u32,

    /// 作業解像度の高さ（ピクセル）
    ///
    /// デフォルト: 640
    pub frame_height: u32,

    /// プレビューの目標レート（Hz）
    ///
    /// キャプチャループのスロットリングに使う
    /// デフォルト: 60
    pub display_rate_hz: u32,
}

impl CameraConfig {
    pub const DEFAULT_FRAME_WIDTH: u32 = 640;
    pub const DEFAULT_FRAME_HEIGHT: u32 = 640;
    pub const DEFAULT_DISPLAY_RATE_HZ: u32 = 60;

    /// プレビュー1フレームあたりの目標時間
    pub fn display_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.display_rate_hz.max(1) as f64)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            frame_width: Self::DEFAULT_FRAME_WIDTH,
            frame_height: Self::DEFAULT_FRAME_HEIGHT,
            display_rate_hz: Self::DEFAULT_DISPLAY_RATE_HZ,
        }
    }
}

/// 検出設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectionConfig {
    /// 検出スコアの閾値（これ以下のボックスは捨てる）
    ///
    /// デフォルト: 0.1
    pub score_threshold: f64,

    /// 検出周期の上限レート（Hz）
    ///
    /// 1周期の処理がこれより速く終わっても次のトリガまで待つ
    /// デフォルト: 30
    pub cycle_rate_hz: u32,

    /// 周期トリガを有効にするか
    ///
    /// false の場合はコンソールからの手動トリガのみ
    #[serde(default)]
    pub auto_trigger: bool,

    /// 周期トリガの間隔（ミリ秒、auto_trigger = true の場合のみ）
    ///
    /// デフォルト: 1000ms
    #[serde(default = "default_auto_trigger_interval_ms")]
    pub auto_trigger_interval_ms: u64,
}

fn default_auto_trigger_interval_ms() -> u64 {
    DetectionConfig::DEFAULT_AUTO_TRIGGER_INTERVAL_MS
}

impl DetectionConfig {
    pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.1;
    pub const DEFAULT_CYCLE_RATE_HZ: u32 = 30;
    pub const DEFAULT_AUTO_TRIGGER_INTERVAL_MS: u64 = 1000;

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.cycle_rate_hz.max(1) as f64)
    }

    pub fn auto_trigger_interval(&self) -> Duration {
        Duration::from_millis(self.auto_trigger_interval_ms)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            score_threshold: Self::DEFAULT_SCORE_THRESHOLD,
            cycle_rate_hz: Self::DEFAULT_CYCLE_RATE_HZ,
            auto_trigger: false,
            auto_trigger_interval_ms: Self::DEFAULT_AUTO_TRIGGER_INTERVAL_MS,
        }
    }
}

/// シャーレ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DishConfig {
    /// シャーレの物理直径（mm）
    ///
    /// 0 の場合は変換係数を更新しない（ピクセル座標のまま）
    /// デフォルト: 88mm
    pub diameter_mm: f64,
}

impl Default for DishConfig {
    fn default() -> Self {
        Self { diameter_mm: 88.0 }
    }
}

/// シリアル通信設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SerialConfig {
    /// シリアルポートのパス（例: "/dev/ttyUSB0", "COM3"）
    ///
    /// 省略時はモックリンクで起動する（装置なし運転）
    #[serde(default)]
    pub port: Option<String>,

    /// ボーレート
    ///
    /// デフォルト: 115200
    pub baud_rate: u32,

    /// 読み取りタイムアウト（ミリ秒）
    ///
    /// シリアルループがシャットダウンを確認する周期を兼ねる
    /// デフォルト: 200ms
    pub read_timeout_ms: u64,

    /// 書き込みタイムアウト（ミリ秒）
    ///
    /// タイムアウトは回復可能な失敗として扱う（再送はしない）
    /// デフォルト: 1000ms
    pub write_timeout_ms: u64,

    /// 再接続の初期バックオフ（ミリ秒）
    ///
    /// デフォルト: 100ms
    pub reconnect_initial_delay_ms: u64,

    /// 再接続の最大バックオフ（ミリ秒、指数バックオフの上限）
    ///
    /// デフォルト: 10000ms
    pub reconnect_max_delay_ms: u64,

    /// 連続トランスポート障害の許容回数
    ///
    /// この回数を超えたら再接続を試みる
    /// デフォルト: 5回
    pub max_consecutive_errors: u32,
}

impl SerialConfig {
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 200;
    pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;
    pub const DEFAULT_RECONNECT_INITIAL_DELAY_MS: u64 = 100;
    pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 10_000;
    pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: Self::DEFAULT_BAUD_RATE,
            read_timeout_ms: Self::DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: Self::DEFAULT_WRITE_TIMEOUT_MS,
            reconnect_initial_delay_ms: Self::DEFAULT_RECONNECT_INITIAL_DELAY_MS,
            reconnect_max_delay_ms: Self::DEFAULT_RECONNECT_MAX_DELAY_MS,
            max_consecutive_errors: Self::DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// フレームバッファの深さ（時間平均に使うフレーム数）
    ///
    /// デフォルト: 10
    pub frame_buffer_depth: usize,

    /// 統計情報の出力間隔（秒）
    pub stats_interval_sec: u64,
}

impl PipelineConfig {
    pub const DEFAULT_FRAME_BUFFER_DEPTH: usize = 10;
    pub const DEFAULT_STATS_INTERVAL_SEC: u64 = 10;

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_sec)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_buffer_depth: Self::DEFAULT_FRAME_BUFFER_DEPTH,
            stats_interval_sec: Self::DEFAULT_STATS_INTERVAL_SEC,
        }
    }
}

/// 世代レコードの保存設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PersistenceConfig {
    /// 同期完了した世代を保存するか
    pub enabled: bool,

    /// 保存先ディレクトリ
    pub output_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: "runs".to_string(),
        }
    }
}

impl AppConfig {
    /// TOMLファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> DomainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content)
            .map_err(|e| DomainError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// デフォルト設定をTOMLファイルに書き出す
    pub fn write_default<P: AsRef<Path>>(path: P) -> DomainResult<()> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config).map_err(|e| {
            DomainError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content)
            .map_err(|e| DomainError::Configuration(format!("Failed to write config file: {}", e)))
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> DomainResult<()> {
        // 作業解像度の検証
        if self.camera.frame_width == 0 || self.camera.frame_height == 0 {
            return Err(DomainError::Configuration(
                "Frame width and height must be greater than 0".to_string(),
            ));
        }
        if self.camera.display_rate_hz == 0 {
            return Err(DomainError::Configuration(
                "Display rate must be greater than 0".to_string(),
            ));
        }

        // 検出設定の検証
        if !(0.0..=1.0).contains(&self.detection.score_threshold) {
            return Err(DomainError::Configuration(
                "Score threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.detection.cycle_rate_hz == 0 {
            return Err(DomainError::Configuration(
                "Detection cycle rate must be greater than 0".to_string(),
            ));
        }

        // シャーレ直径の検証（0は「未較正のまま運転」として許容）
        if self.dish.diameter_mm < 0.0 {
            return Err(DomainError::Configuration(
                "Dish diameter must be non-negative".to_string(),
            ));
        }

        // シリアル設定の検証
        if self.serial.baud_rate == 0 {
            return Err(DomainError::Configuration(
                "Baud rate must be greater than 0".to_string(),
            ));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(DomainError::Configuration(
                "Serial read timeout must be greater than 0".to_string(),
            ));
        }
        if self.serial.reconnect_initial_delay_ms > self.serial.reconnect_max_delay_ms {
            return Err(DomainError::Configuration(
                "Reconnect initial delay must not exceed max delay".to_string(),
            ));
        }

        // パイプライン設定の検証
        if self.pipeline.frame_buffer_depth == 0 {
            return Err(DomainError::Configuration(
                "Frame buffer depth must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
