//! 外部入力（start / reset ボタン）の整形
//!
//! 生のボタン信号をシーケンサに渡す前に通す小さなフィルタ群。
//! 演算 FSM とは独立しており、使わずに `Orchestrator` を直接駆動してもよい。
//!
//! ```text
//! raw --> Synchronizer (2 段) --> Debouncer (N ticks) --> EdgeDetector --> 1-tick pulse
//! ```

use crate::error::QmlpResult;
use crate::orchestrator::Orchestrator;

/// 既定のデバウンス期間（tick）
pub const DEFAULT_DEBOUNCE_TICKS: u32 = 4;

/// 2 段フリップフロップによる同期化
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Synchronizer {
    stage1: bool,
    stage2: bool,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1 tick 進めて 2 段目の値を返す
    #[inline]
    pub fn step(&mut self, raw: bool) -> bool {
        self.stage2 = self.stage1;
        self.stage1 = raw;
        self.stage2
    }
}

/// チャタリング除去
///
/// 入力が `ticks` 回連続で同じ値を取ったときだけ出力を切り替える。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    ticks: u32,
    count: u32,
    stable: bool,
}

impl Debouncer {
    /// `ticks` が 0 の場合は 1 として扱う
    pub fn new(ticks: u32) -> Self {
        Self {
            ticks: ticks.max(1),
            count: 0,
            stable: false,
        }
    }

    #[inline]
    pub fn step(&mut self, input: bool) -> bool {
        if input == self.stable {
            self.count = 0;
        } else {
            self.count += 1;
            if self.count >= self.ticks {
                self.stable = input;
                self.count = 0;
            }
        }
        self.stable
    }

    pub fn level(&self) -> bool {
        self.stable
    }
}

/// 立ち上がりエッジ検出
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetector {
    prev: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 立ち上がった tick だけ真を返す
    #[inline]
    pub fn step(&mut self, level: bool) -> bool {
        let rising = level && !self.prev;
        self.prev = level;
        rising
    }
}

/// 同期化 → デバウンス → エッジ検出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConditioner {
    sync: Synchronizer,
    debounce: Debouncer,
    edge: EdgeDetector,
}

impl ButtonConditioner {
    pub fn new(debounce_ticks: u32) -> Self {
        Self {
            sync: Synchronizer::new(),
            debounce: Debouncer::new(debounce_ticks),
            edge: EdgeDetector::new(),
        }
    }

    /// 生の信号を 1 tick 分処理し、押下エッジなら真を返す
    #[inline]
    pub fn step(&mut self, raw: bool) -> bool {
        let synced = self.sync.step(raw);
        let level = self.debounce.step(synced);
        self.edge.step(level)
    }
}

impl Default for ButtonConditioner {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_TICKS)
    }
}

/// 入力整形付きシーケンサ
///
/// start と reset の生信号をそれぞれ `ButtonConditioner` に通してから
/// `Orchestrator` に渡す。reset のエッジは同じ tick の start より優先され、
/// シーケンサを初期状態に戻す。
#[derive(Debug, Clone)]
pub struct ConditionedOrchestrator {
    inner: Orchestrator,
    start: ButtonConditioner,
    reset: ButtonConditioner,
}

impl ConditionedOrchestrator {
    pub fn new(inner: Orchestrator, debounce_ticks: u32) -> Self {
        Self {
            inner,
            start: ButtonConditioner::new(debounce_ticks),
            reset: ButtonConditioner::new(debounce_ticks),
        }
    }

    /// 1 tick 進める。戻り値は done
    pub fn step(&mut self, raw_start: bool, raw_reset: bool) -> QmlpResult<bool> {
        let start = self.start.step(raw_start);
        if self.reset.step(raw_reset) {
            log::debug!("reset edge detected");
            self.inner.reset();
            return Ok(false);
        }
        self.inner.step(start)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.inner
    }

    pub fn into_inner(self) -> Orchestrator {
        self.inner
    }
}
