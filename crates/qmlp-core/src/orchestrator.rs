//! トップレベルのシーケンサ
//!
//! 層エンジン 2 つと argmax を順に起動し、1 回の推論で 1 つのクラスを確定する。
//!
//! ```text
//! IDLE --start--> LAYER1 --done--> LAYER2 --done--> ARGMAX --(OUT2-1 steps)--> DONE --> IDLE
//! ```
//!
//! - `RunMode::Interactive`: IDLE で start を待つ
//! - `RunMode::FreeRunning`: IDLE で即座に次の推論を始める（起動直後も含む）
//!
//! 同時に動く層エンジンは常に 1 つだけ（start/done ハンドシェイク）。
//! `reset` は計算途中の状態をすべて破棄し、部分的な結果は公開しない。

use serde::{Deserialize, Serialize};

use crate::argmax::ArgmaxReducer;
use crate::error::{QmlpError, QmlpResult};
use crate::layer::LayerEngine;
use crate::memory::{Ram, Rom};
use crate::model::QuantizedMlp;
use crate::quantize::{PassThrough, Quantized};

/// 起動モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// 外部トリガを待つ
    #[default]
    Interactive,
    /// 完了後（および起動直後）に自動で再実行する
    FreeRunning,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(RunMode::Interactive),
            "free-running" | "free_running" => Ok(RunMode::FreeRunning),
            other => Err(format!("unknown run mode: {other}")),
        }
    }
}

/// シーケンサのステート
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    Layer1,
    Layer2,
    Argmax,
    Done,
}

impl OrchestratorState {
    pub const fn name(self) -> &'static str {
        match self {
            OrchestratorState::Idle => "IDLE",
            OrchestratorState::Layer1 => "LAYER1",
            OrchestratorState::Layer2 => "LAYER2",
            OrchestratorState::Argmax => "ARGMAX",
            OrchestratorState::Done => "DONE",
        }
    }
}

/// 推論シーケンサ
#[derive(Debug, Clone)]
pub struct Orchestrator {
    mode: RunMode,
    input: Rom<i8>,
    layer1: LayerEngine<Quantized>,
    layer2: LayerEngine<PassThrough>,
    hidden: Ram<i8>,
    logits: Ram<i32>,
    reducer: ArgmaxReducer,
    state: OrchestratorState,
    /// 次のステップで層エンジンに与える start
    issue_start: bool,
    done: bool,
    predicted: Option<usize>,
    /// 実行中の推論の経過ステップ数
    cycles: u64,
    last_run_cycles: Option<u64>,
    completed_runs: u64,
}

impl Orchestrator {
    /// モデルと入力ベクトルから構築
    pub fn new(model: &QuantizedMlp, input: Vec<i8>, mode: RunMode) -> QmlpResult<Self> {
        let input = model.input_rom(input)?;
        let dims = model.dims();
        Ok(Self {
            mode,
            input,
            layer1: LayerEngine::new(model.layer1().clone(), model.layer1_policy()),
            layer2: LayerEngine::new(model.layer2().clone(), model.layer2_policy()),
            hidden: Ram::new("hidden", dims.hidden_dim),
            logits: Ram::new("logits", dims.num_classes),
            reducer: ArgmaxReducer::new(),
            state: OrchestratorState::Idle,
            issue_start: false,
            done: false,
            predicted: None,
            cycles: 0,
            last_run_cycles: None,
            completed_runs: 0,
        })
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == OrchestratorState::Idle
    }

    /// 直前のステップで done が立ったか
    #[inline]
    pub fn done(&self) -> bool {
        self.done
    }

    /// 最後に確定した予測クラス（次の推論が完了するまで保持）
    pub fn predicted_class(&self) -> Option<usize> {
        self.predicted
    }

    /// 層 1 の出力
    pub fn hidden(&self) -> &[i8] {
        self.hidden.as_slice()
    }

    /// 層 2 の出力
    pub fn logits(&self) -> &[i32] {
        self.logits.as_slice()
    }

    pub fn input(&self) -> &[i8] {
        self.input.as_slice()
    }

    pub fn last_run_cycles(&self) -> Option<u64> {
        self.last_run_cycles
    }

    pub fn completed_runs(&self) -> u64 {
        self.completed_runs
    }

    /// 1 回の推論にかかるステップ数（start 受付から done まで）
    pub fn expected_run_cycles(&self) -> u64 {
        let l1 = LayerEngine::<Quantized>::pass_steps(self.layer1.in_dim(), self.layer1.out_dim());
        let l2 =
            LayerEngine::<PassThrough>::pass_steps(self.layer2.in_dim(), self.layer2.out_dim());
        let argmax = self.layer2.out_dim() - 1;
        (1 + l1 + l2 + argmax + 1) as u64
    }

    /// 入力ベクトルを差し替える（IDLE 中のみ）
    pub fn set_input(&mut self, input: Vec<i8>) -> QmlpResult<()> {
        if !self.is_idle() {
            return Err(QmlpError::Busy(self.state.name()));
        }
        self.input = Rom::with_len("input", input, self.layer1.in_dim())?;
        Ok(())
    }

    /// 全体リセット
    ///
    /// 計算途中の層エンジン・argmax・予測クラスを破棄する。
    /// 出力 RAM には完了済みの書き込みだけが残る。
    pub fn reset(&mut self) {
        if !self.is_idle() {
            log::debug!("reset during {}: discarding in-flight run", self.state.name());
        }
        self.layer1.reset();
        self.layer2.reset();
        self.hidden.discard_pending();
        self.logits.discard_pending();
        self.reducer.reset();
        self.state = OrchestratorState::Idle;
        self.issue_start = false;
        self.done = false;
        self.predicted = None;
        self.cycles = 0;
    }

    /// 1 ステップ進める
    ///
    /// 戻り値は done。`start` は IDLE（Interactive）でのみ参照される。
    pub fn step(&mut self, start: bool) -> QmlpResult<bool> {
        self.done = false;
        if !self.is_idle() {
            self.cycles += 1;
        }

        match self.state {
            OrchestratorState::Idle => {
                if start || self.mode == RunMode::FreeRunning {
                    self.cycles = 1;
                    self.issue_start = true;
                    self.transition(OrchestratorState::Layer1);
                    log::debug!("run {} started ({:?})", self.completed_runs + 1, self.mode);
                }
            }
            OrchestratorState::Layer1 => {
                let start = std::mem::take(&mut self.issue_start);
                if self.layer1.step(start, &self.input, &mut self.hidden)? {
                    self.issue_start = true;
                    self.transition(OrchestratorState::Layer2);
                }
            }
            OrchestratorState::Layer2 => {
                let start = std::mem::take(&mut self.issue_start);
                if self.layer2.step(start, &self.hidden, &mut self.logits)? {
                    self.reducer.begin(self.logits.as_slice())?;
                    if self.reducer.is_finished() {
                        self.transition(OrchestratorState::Done);
                    } else {
                        self.transition(OrchestratorState::Argmax);
                    }
                }
            }
            OrchestratorState::Argmax => {
                if self.reducer.step(self.logits.as_slice())? {
                    self.transition(OrchestratorState::Done);
                }
            }
            OrchestratorState::Done => {
                let class = self.reducer.best_index();
                self.predicted = Some(class);
                self.done = true;
                self.completed_runs += 1;
                self.last_run_cycles = Some(self.cycles);
                log::debug!(
                    "run {} done: class={class} cycles={}",
                    self.completed_runs,
                    self.cycles
                );
                self.transition(OrchestratorState::Idle);
            }
        }

        Ok(self.done)
    }

    /// start を与えて done まで回し、予測クラスを返す
    pub fn run_inference(&mut self) -> QmlpResult<usize> {
        loop {
            if self.step(true)? {
                return Ok(self.reducer.best_index());
            }
        }
    }

    #[inline]
    fn transition(&mut self, next: OrchestratorState) {
        log::trace!("{} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}
