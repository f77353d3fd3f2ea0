//! 再接続ロジックモジュール
//!
//! シリアルリンクの再接続を指数バックオフで制御します。
//! 装置が外れても読み取りループ自体は止めず、復帰に備えて
//! 接続試行を続ける方針（ベストエフォート）。

use std::time::Duration;

/// 再接続戦略
#[derive(Debug, Clone)]
pub struct RecoveryStrategy {
    /// 連続トランスポート障害の閾値（この回数に達したら再接続）
    pub consecutive_error_threshold: u32,
    /// 初期バックオフ時間
    pub initial_backoff: Duration,
    /// 最大バックオフ時間
    pub max_backoff: Duration,
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self {
            consecutive_error_threshold: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// 再接続状態管理
#[derive(Debug)]
pub struct RecoveryState {
    strategy: RecoveryStrategy,
    consecutive_errors: u32,
    current_backoff: Duration,
    total_reconnects: u64,
}

impl RecoveryState {
    pub fn new(strategy: RecoveryStrategy) -> Self {
        Self {
            current_backoff: strategy.initial_backoff,
            strategy,
            consecutive_errors: 0,
            total_reconnects: 0,
        }
    }

    /// デフォルト戦略でRecoveryStateを作成
    pub fn with_default_strategy() -> Self {
        Self::new(RecoveryStrategy::default())
    }

    /// トランスポート障害を記録
    ///
    /// # Returns
    /// 再接続を試みるべき場合は true
    pub fn record_error(&mut self) -> bool {
        self.consecutive_errors += 1;
        self.consecutive_errors >= self.strategy.consecutive_error_threshold
    }

    /// 成功を記録（カウンタとバックオフをリセット）
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.current_backoff = self.strategy.initial_backoff;
    }

    /// 再接続試行を記録
    ///
    /// 指数バックオフ: 次回の待機時間を2倍にする（上限あり）
    pub fn record_reconnect_attempt(&mut self) {
        self.total_reconnects += 1;
        self.consecutive_errors = 0;
        self.current_backoff = (self.current_backoff * 2).min(self.strategy.max_backoff);
    }

    /// 現在のバックオフ時間を取得
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    pub fn total_reconnects(&self) -> u64 {
        self.total_reconnects
    }
}
