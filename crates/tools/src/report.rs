//! 推論の実行と結果の集計

use qmlp_core::{ArtifactSet, ConditionedOrchestrator, Orchestrator, QmlpResult, RunMode, forward};
use serde::Serialize;

/// 1 回分の推論結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run: u64,
    pub predicted: usize,
    pub cycles: u64,
}

/// 実行結果のまとめ（`--json` で出力する）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
    pub shift1: u32,
    pub expected_cycles: u64,
    pub runs: Vec<RunRecord>,
    pub reference_pred: usize,
    pub golden_pred: Option<usize>,
    pub sample_label: Option<usize>,
    pub hidden: Vec<i8>,
    pub logits: Vec<i32>,
}

impl RunReport {
    /// 最後の推論結果
    pub fn predicted(&self) -> Option<usize> {
        self.runs.last().map(|r| r.predicted)
    }

    /// エンジンの結果が参照実装・golden と一致しない理由を列挙する
    pub fn mismatches(&self) -> Vec<String> {
        let mut out = Vec::new();
        for record in &self.runs {
            if record.predicted != self.reference_pred {
                out.push(format!(
                    "run {}: engine predicted {} but reference predicted {}",
                    record.run, record.predicted, self.reference_pred
                ));
            }
            if record.cycles != self.expected_cycles {
                out.push(format!(
                    "run {}: took {} cycles, expected {}",
                    record.run, record.cycles, self.expected_cycles
                ));
            }
        }
        if let Some(golden) = self.golden_pred
            && golden != self.reference_pred
        {
            out.push(format!(
                "golden prediction {golden} differs from reference prediction {}",
                self.reference_pred
            ));
        }
        out
    }
}

/// サイクル単位でエンジンを回し、`runs` 回分の推論を集計する
///
/// 対話モードでは開始ボタンを押して離す操作を入力調整回路越しに与える。
/// フリーランでは何も押さずに周期完了を待つ。
pub fn run_engine(
    set: &ArtifactSet,
    mode: RunMode,
    debounce_ticks: u32,
    runs: u64,
) -> QmlpResult<RunReport> {
    let reference = forward(&set.model, &set.sample_input)?;
    let orch = Orchestrator::new(&set.model, set.sample_input.clone(), mode)?;
    let expected_cycles = orch.expected_run_cycles();
    let mut panel = ConditionedOrchestrator::new(orch, debounce_ticks);

    // 同期化 2 段 + デバウンス + 余裕
    let press_ticks = u64::from(debounce_ticks.max(1)) + 4;
    let tick_limit = (expected_cycles + 2 * press_ticks) * 2;

    let mut records = Vec::new();
    for run in 0..runs {
        let pressed_ticks = if mode == RunMode::Interactive { press_ticks } else { 0 };
        if let Some(record) = drive_run(&mut panel, run, pressed_ticks, tick_limit)? {
            records.push(record);
        }

        if mode == RunMode::Interactive {
            // ボタンを離した状態を安定させる
            for _ in 0..press_ticks {
                panel.step(false, false)?;
            }
        }
    }

    let orch = panel.orchestrator();
    let dims = set.model.dims();
    Ok(RunReport {
        mode,
        input_dim: dims.input_dim,
        hidden_dim: dims.hidden_dim,
        num_classes: dims.num_classes,
        shift1: set.model.shift1().get(),
        expected_cycles,
        runs: records,
        reference_pred: reference.predicted,
        golden_pred: set.golden_pred,
        sample_label: set.sample_label,
        hidden: orch.hidden().to_vec(),
        logits: orch.logits().to_vec(),
    })
}

/// 1 回分の推論を done まで回す
///
/// 最初の `press_ticks` tick だけ開始ボタンを押す。`tick_limit` を超えても
/// 完了しなければ `None`（前回の結果は記録しない）。
fn drive_run(
    panel: &mut ConditionedOrchestrator,
    run: u64,
    press_ticks: u64,
    tick_limit: u64,
) -> QmlpResult<Option<RunRecord>> {
    let completed_before = panel.orchestrator().completed_runs();
    let mut tick = 0u64;
    while !panel.step(tick < press_ticks, false)? {
        tick += 1;
        if tick > tick_limit {
            log::warn!("run {run} did not finish within {tick_limit} ticks");
            return Ok(None);
        }
    }

    let orch = panel.orchestrator();
    if orch.completed_runs() == completed_before {
        return Ok(None);
    }
    match (orch.predicted_class(), orch.last_run_cycles()) {
        (Some(predicted), Some(cycles)) => {
            log::debug!("run {run}: predicted={predicted} cycles={cycles}");
            Ok(Some(RunRecord { run, predicted, cycles }))
        }
        _ => Ok(None),
    }
}
