//! シリアルプロトコルエンジン
//!
//! 装置主導のENTER/PTハンドシェイクと補正ストリームを管理する
//! 純粋状態機械。I/Oは持たず、1行入力→応答行（と完了通知）への
//! 遷移だけを実装する。トランスポートはApplication層のシリアル
//! ループが担う。
//!
//! # ワイヤプロトコル（ASCII・改行区切り）
//! - 装置→ホスト: `ENTER`（次の点の要求）、`P = (<x>, <y>)`（実位置報告）
//! - ホスト→装置: `PT(<x>,<y>)`（物理座標ターゲット、小数4桁）

use crate::domain::geometry::Point;

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// ターゲット未発行
    Idle,
    /// ターゲット発行済み、配達中
    Armed,
    /// 全点送信済み、補正待ち
    AwaitingCorrection,
    /// この世代の補正が揃った
    Synced,
}

/// 1行を処理した結果
///
/// `reply`はそのまま装置へ書く行（改行なし）。`completed`は
/// Syncedへの遷移時のみ真になり、世代ごとに高々1回しか立たない。
#[derive(Debug, Clone, PartialEq)]
pub struct LineOutcome {
    pub reply: Option<String>,
    pub completed: bool,
}

impl LineOutcome {
    fn silent() -> Self {
        Self {
            reply: None,
            completed: false,
        }
    }
}

/// シリアルセッション
///
/// 不変条件: `0 ≤ cursor ≤ data_buffer.len()`、
/// `corrections.len() ≤ data_buffer.len()`、世代番号は単調増加。
/// 構造体全体を1つのMutexで守り、`set_targets`による世代交代は
/// 外から見て常に完全な形で起きる。
#[derive(Debug)]
pub struct SerialSession {
    state: SessionState,
    generation: u64,
    data_buffer: Vec<String>,
    cursor: usize,
    corrections: Vec<Point>,
}

impl SerialSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            data_buffer: Vec::new(),
            cursor: 0,
            corrections: Vec::new(),
        }
    }

    /// 新しい世代のターゲット列を発行する（世代境界）
    ///
    /// バッファを丸ごと差し替え、カーソルと補正列をリセットする。
    /// 進行中のセッションがあっても常にArmedへ遷移し、前世代は
    /// 問答無用で破棄される。世代番号のインクリメントにより、
    /// リセット直後に届いた前世代の補正（cursor==0の窓）は
    /// 迷子として識別できる。
    pub fn set_targets(&mut self, targets: &[Point]) {
        self.data_buffer = targets.iter().map(wire_point).collect();
        self.cursor = 0;
        self.corrections.clear();
        self.generation += 1;
        self.state = SessionState::Armed;

        tracing::info!(
            "Session rearmed: generation={}, targets={}",
            self.generation,
            self.data_buffer.len()
        );
    }

    /// 装置からの1行をディスパッチする
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        let trimmed = line.trim();

        if trimmed == "ENTER" {
            return self.handle_enter();
        }

        match parse_correction(trimmed) {
            Some(point) => self.handle_correction(point),
            None => {
                if trimmed.starts_with("P =") {
                    // 補正らしき行がパースできない場合はフェイルクローズ
                    tracing::warn!("Malformed correction line discarded: {:?}", trimmed);
                } else if !trimmed.is_empty() {
                    tracing::debug!("Unrecognized device line: {:?}", trimmed);
                }
                LineOutcome::silent()
            }
        }
    }

    /// ENTER: 装置が次の点を1つ要求（フロー制御）
    ///
    /// 未送信の点があればPT行を返してカーソルを進める。
    /// 尽きていれば沈黙する（装置側は無応答を許容する）。
    fn handle_enter(&mut self) -> LineOutcome {
        if self.cursor < self.data_buffer.len() {
            let reply = format!("PT{}", self.data_buffer[self.cursor]);
            self.cursor += 1;

            if self.cursor == self.data_buffer.len() && self.state == SessionState::Armed {
                self.state = SessionState::AwaitingCorrection;
            }

            tracing::debug!(
                "Point {}/{} pulled (generation {})",
                self.cursor,
                self.data_buffer.len(),
                self.generation
            );

            LineOutcome {
                reply: Some(reply),
                completed: false,
            }
        } else {
            tracing::debug!(
                "ENTER with drained queue (generation {}), staying silent",
                self.generation
            );
            LineOutcome::silent()
        }
    }

    /// 補正報告: 直近に送った点（cursor−1）に位置で対応づける
    fn handle_correction(&mut self, point: Point) -> LineOutcome {
        if self.cursor == 0 {
            // 送信前の補正。プロトコル違反か、世代交代直後に届いた
            // 前世代の残滓。どちらもこの世代には属さないので読み捨てる。
            tracing::warn!(
                "Discarding correction ({:.4}, {:.4}) with no point sent in generation {}",
                point.x,
                point.y,
                self.generation
            );
            return LineOutcome::silent();
        }

        if self.corrections.len() >= self.data_buffer.len() {
            // 既に揃っている世代への余剰報告
            tracing::warn!(
                "Discarding surplus correction ({:.4}, {:.4}) in generation {}",
                point.x,
                point.y,
                self.generation
            );
            return LineOutcome::silent();
        }

        self.corrections.push(point);

        if self.corrections.len() == self.data_buffer.len() && self.state != SessionState::Synced {
            self.state = SessionState::Synced;
            tracing::info!(
                "Generation {} synced: {} corrections collected",
                self.generation,
                self.corrections.len()
            );
            return LineOutcome {
                reply: None,
                completed: true,
            };
        }

        LineOutcome::silent()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn target_count(&self) -> usize {
        self.data_buffer.len()
    }

    /// この世代のワイヤ形式ターゲット列
    pub fn wire_targets(&self) -> &[String] {
        &self.data_buffer
    }

    pub fn corrections(&self) -> &[Point] {
        &self.corrections
    }
}

impl Default for SerialSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 物理座標をワイヤ形式の点文字列にする
pub fn wire_point(p: &Point) -> String {
    format!("({:.4},{:.4})", p.x, p.y)
}

/// 補正行 `P = (<f>, <f>)` の厳密パーサ
///
/// 数値2つ以外は一切受理しない。汎用の式評価にかけるのは装置由来の
/// 文字列に対して危険なため、形式が崩れていたらNoneで打ち切る。
fn parse_correction(line: &str) -> Option<Point> {
    let rest = line.strip_prefix("P = (")?.strip_suffix(')')?;
    let (xs, ys) = rest.split_once(',')?;

    let x: f64 = xs.trim().parse().ok()?;
    let y: f64 = ys.trim().parse().ok()?;

    Some(Point::new(x, y))
}
