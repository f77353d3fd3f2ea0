//! colony-picker - Library
//!
//! シャーレ内のコロニーを検出し、物理座標ターゲットとしてピッカー装置へ
//! 半二重シリアルプロトコルで配達するパイプライン。
//! バイナリターゲット（本体・schema生成）と統合テストから
//! モジュールにアクセスするために提供されています。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;
