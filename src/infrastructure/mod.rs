//! Infrastructure層: 外部技術の統合
//!
//! Domain層のtraitを実装し、外部（シリアル装置・ファイルシステム・
//! カメラ/推論コラボレータ）と接続する。

pub mod mock_capture;
pub mod mock_comm;
pub mod mock_vision;
pub mod persistence;
pub mod preview;
pub mod serial_comm;
