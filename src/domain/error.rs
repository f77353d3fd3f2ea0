/// エラー型定義
///
/// Domain層の統一エラー型。thiserrorを使用して型安全なエラー処理を提供します。
///
/// # 設計方針
/// - unwrap()の使用を禁止し、明示的なエラーハンドリングを強制
/// - 回復可能性は呼び出し側のループで判断する（キャリブレーション失敗は
///   その周期をスキップ、トランスポート失敗はログのみで読み取り継続）

use thiserror::Error;

/// Domain層の統一エラー型
#[derive(Error, Debug)]
pub enum DomainError {
    /// カメラキャプチャ関連のエラー
    #[error("Capture error: {0}")]
    Capture(String),

    /// セグメンテーションコラボレータのエラー
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// 検出コラボレータのエラー
    #[error("Detection error: {0}")]
    Detection(String),

    /// キャリブレーション失敗
    ///
    /// マスクの前景ピクセルが0など、モーメント計算が定義できない場合。
    /// NaNを伝播させず必ずこのエラーで打ち切る。
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// プロトコル違反（送信前の補正受信、不正な補正行など）
    ///
    /// 非致命。ログして読み捨てる。
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// シリアルトランスポートのエラー（書き込みタイムアウト、切断等）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 設定関連のエラー
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 世代レコードの保存エラー
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Domain層の統一Result型
pub type DomainResult<T> = Result<T, DomainError>;
