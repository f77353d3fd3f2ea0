/// Port定義（Clean Architectureのインターフェース）
///
/// Domain層が外部実装に依存するための抽象trait。
/// Infrastructure層がこれらを実装し、Application層がDIで注入する。
/// 検出・セグメンテーションの中身（ONNX推論、watershed等）はこの境界の外。

use crate::domain::{BinaryMask, DomainResult, Frame, GenerationRecord, RawDetection};

/// キャプチャポート: カメラフレームの取得を抽象化
pub trait CapturePort: Send {
    /// 1フレームを取得する（ブロッキング）
    ///
    /// # Returns
    /// - `Ok(Frame)`: ネイティブ解像度のBGRフレーム
    /// - `Err(DomainError)`: 取得失敗（キャプチャループはログして継続）
    fn read_frame(&mut self) -> DomainResult<Frame>;

    /// キャプチャデバイスの情報を取得
    fn device_info(&self) -> CameraInfo;
}

/// カメラデバイス情報
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub name: String,
}

/// 検出ポート: コロニー検出の推論を抽象化
///
/// 同一入力に対して決定的であることを仮定する。リトライはしない。
pub trait DetectorPort: Send {
    /// フレームを推論して生の検出ボックス列を返す
    ///
    /// NMS・クラス分類は実装側の責務。返り値の並び順は
    /// そのまま装置への配達順になるため、実装は順序を安定させること。
    fn infer(&mut self, frame: &Frame, score_threshold: f64) -> DomainResult<Vec<RawDetection>>;
}

/// セグメンテーションポート: シャーレ前景マスクの生成を抽象化
pub trait SegmenterPort: Send {
    /// フレームと同サイズの2値マスクを返す（非ゼロ=シャーレ内部候補）
    fn segment(&mut self, frame: &Frame) -> DomainResult<BinaryMask>;
}

/// シリアルリンク: 装置との行指向半二重チャネルを抽象化
pub trait SerialLink: Send {
    /// 1行読む（改行は除去済み）
    ///
    /// # Returns
    /// - `Ok(Some(line))`: 完全な1行を受信
    /// - `Ok(None)`: タイムアウト（シャットダウン確認の機会）
    /// - `Err(DomainError)`: トランスポート障害
    fn read_line(&mut self) -> DomainResult<Option<String>>;

    /// 1行書く（改行は実装側で付与）
    fn write_line(&mut self, line: &str) -> DomainResult<()>;

    /// 装置との接続状態を確認
    fn is_connected(&self) -> bool;

    /// 装置との接続を再試行
    ///
    /// レート制限や指数バックオフはApplication層（recovery）で実装。
    fn reconnect(&mut self) -> DomainResult<()>;
}

// 実行時にアダプタを選ぶ箇所（シリアル・永続化）のためのBox転送実装
impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn read_line(&mut self) -> DomainResult<Option<String>> {
        (**self).read_line()
    }

    fn write_line(&mut self, line: &str) -> DomainResult<()> {
        (**self).write_line(line)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reconnect(&mut self) -> DomainResult<()> {
        (**self).reconnect()
    }
}

/// 永続化ポート: 同期完了した世代の記録を抽象化
pub trait PersistencePort: Send {
    /// 1世代分の予測・補正・フレームをタイムスタンプキーで保存する
    fn save_generation(&mut self, record: &GenerationRecord) -> DomainResult<()>;
}

impl<T: PersistencePort + ?Sized> PersistencePort for Box<T> {
    fn save_generation(&mut self, record: &GenerationRecord) -> DomainResult<()> {
        (**self).save_generation(record)
    }
}

/// プレビューポート: 合成済みフレームの表示先を抽象化
///
/// GUIはスコープ外のため、本体はログのみのアダプタを使う。
pub trait PreviewPort: Send {
    fn present(&mut self, frame: &Frame) -> DomainResult<()>;
}
