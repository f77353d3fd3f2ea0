//! Application Layer
//!
//! パイプライン制御、シリアル再接続ロジック、統計管理、
//! オペレータコンソールなどのユースケースを実装します。
//!
//! ## モジュール構成
//! - `pipeline`: 3スレッドパイプライン制御（Capture/Detection/Serial）
//! - `threads`: 各ループの実装本体
//! - `console`: 制御スレッドの対話インターフェース（GUIの代替）
//! - `recovery`: シリアル再接続ロジック（指数バックオフ）
//! - `runtime_state`: 協調的シャットダウンのフラグ
//! - `stats`: 統計情報管理（周期レート、レイテンシ）

pub mod console;
pub mod pipeline;
pub mod recovery;
pub mod runtime_state;
pub mod stats;
mod threads;
