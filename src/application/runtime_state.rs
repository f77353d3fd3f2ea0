//! ランタイム状態管理（Application層）
//!
//! 協調的シャットダウンのフラグを3つのワーカーループと制御スレッドで
//! 共有する。`Arc<AtomicBool>`によるロックフリー設計で、各ループは
//! ブロッキング呼び出しの境界ごとに数CPUサイクルで状態を確認できる。

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// ランタイム状態（スレッド間で共有、ロックフリー）
///
/// # メモリオーダー
/// Relaxedで十分。シャットダウンの観測が1ループ分遅れても、
/// 各ループは次のブロッキング境界で必ず確認するため無害。
#[derive(Clone)]
pub struct RuntimeState {
    running: Arc<AtomicBool>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// ループを継続してよいか（ロックフリー、超高速）
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// 全ループへシャットダウンを要求する
    ///
    /// 強制打ち切りはしない。実行中の推論やシリアル書き込みは
    /// 完了してから、各ループが次の境界で停止する。
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}
