/// プレビューアダプタ
///
/// GUIはスコープ外のため、合成済みプレビューは受け取って数えるだけの
/// 実装で運転する。ウィンドウ表示が必要になったらこのポートの別実装を
/// 差すだけでよい。

use crate::domain::{DomainResult, Frame, PreviewPort};

/// 表示なしのプレビューアダプタ
pub struct NullPreviewAdapter {
    presented: u64,
}

impl NullPreviewAdapter {
    pub fn new() -> Self {
        Self { presented: 0 }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Default for NullPreviewAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewPort for NullPreviewAdapter {
    fn present(&mut self, frame: &Frame) -> DomainResult<()> {
        self.presented += 1;

        if self.presented.is_multiple_of(600) {
            tracing::debug!(
                "Preview frame {}: {}x{}",
                self.presented,
                frame.width,
                frame.height
            );
        }

        Ok(())
    }
}
