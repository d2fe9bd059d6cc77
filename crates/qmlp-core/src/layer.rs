//! 逐次 MAC 層エンジン
//!
//! 1 ステップにつき 1 回の積和演算を行う全結合層。
//! 層 1 と層 2 で同じエンジンを使い、出力ポリシー（`Requantize`）だけが異なる。
//!
//! ```text
//! IDLE --start--> LOAD_BIAS --> MAC x IN --> WRITE --(j < OUT-1)--> LOAD_BIAS
//!                                              |
//!                                              +--(j == OUT-1)--> DONE --> IDLE
//! ```
//!
//! 1 回のパスは start を受け付けたステップ + `OUT * (IN + 2)` + DONE の 1 ステップ。

use crate::error::{QmlpError, QmlpResult};
use crate::memory::{Ram, ReadPort, Rom};
use crate::quantize::Requantize;

/// start 受付と DONE の固定オーバーヘッド（ステップ数）
pub const PASS_OVERHEAD_STEPS: usize = 2;

/// 層エンジンのステート
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerState {
    /// start 待ち
    #[default]
    Idle,
    /// バイアスをアキュムレータにロード
    LoadBias,
    /// 積和演算
    Mac,
    /// 出力書き込み
    Write,
    /// 完了（done を 1 ステップだけ立てる）
    Done,
}

/// 層の重みとバイアス
///
/// 重みは OUT×IN の行優先（`w[j,k]` は `j * IN + k`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerTables {
    in_dim: usize,
    out_dim: usize,
    weights: Rom<i8>,
    biases: Rom<i32>,
}

impl LayerTables {
    /// 次元を検証して生成
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        weights: Rom<i8>,
        biases: Rom<i32>,
    ) -> QmlpResult<Self> {
        if in_dim == 0 {
            return Err(QmlpError::ZeroDimension(weights.name()));
        }
        if out_dim == 0 {
            return Err(QmlpError::ZeroDimension(biases.name()));
        }
        let expected = in_dim.checked_mul(out_dim).ok_or(QmlpError::TableTooLarge {
            table: weights.name(),
            rows: out_dim,
            cols: in_dim,
        })?;
        if weights.len() != expected {
            return Err(QmlpError::DimensionMismatch {
                table: weights.name(),
                expected,
                actual: weights.len(),
            });
        }
        if biases.len() != out_dim {
            return Err(QmlpError::DimensionMismatch {
                table: biases.name(),
                expected: out_dim,
                actual: biases.len(),
            });
        }
        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn weights(&self) -> &Rom<i8> {
        &self.weights
    }

    pub fn biases(&self) -> &Rom<i32> {
        &self.biases
    }

    /// `w[j,k]` を読む
    #[inline]
    pub fn weight(&self, neuron: usize, input: usize) -> QmlpResult<i8> {
        self.weights.read(neuron * self.in_dim + input)
    }
}

/// 逐次 MAC 層エンジン
#[derive(Debug, Clone)]
pub struct LayerEngine<P: Requantize> {
    tables: LayerTables,
    policy: P,
    state: LayerState,
    /// 出力ニューロンカウンタ j
    neuron: usize,
    /// 入力カウンタ k
    input_index: usize,
    acc: i32,
    done: bool,
}

impl<P: Requantize> LayerEngine<P> {
    pub fn new(tables: LayerTables, policy: P) -> Self {
        Self {
            tables,
            policy,
            state: LayerState::Idle,
            neuron: 0,
            input_index: 0,
            acc: 0,
            done: false,
        }
    }

    /// 1 パスにかかるステップ数（start 受付から done まで）
    pub const fn pass_steps(in_dim: usize, out_dim: usize) -> usize {
        out_dim * (in_dim + 2) + PASS_OVERHEAD_STEPS
    }

    pub fn tables(&self) -> &LayerTables {
        &self.tables
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn in_dim(&self) -> usize {
        self.tables.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.tables.out_dim
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == LayerState::Idle
    }

    /// 直前のステップで done が立ったか
    #[inline]
    pub fn done(&self) -> bool {
        self.done
    }

    /// 現在のアキュムレータ値
    pub fn accumulator(&self) -> i32 {
        self.acc
    }

    /// 現在の出力ニューロン番号
    pub fn neuron(&self) -> usize {
        self.neuron
    }

    /// 非同期リセット
    ///
    /// 計算途中のニューロンは書き込まれない。完了済みの WRITE は出力に残る。
    pub fn reset(&mut self) {
        self.state = LayerState::Idle;
        self.neuron = 0;
        self.input_index = 0;
        self.acc = 0;
        self.done = false;
    }

    /// 1 ステップ進める
    ///
    /// 戻り値は done（このステップで完了したか）。
    /// IDLE 以外で立った `start` は無視される。
    pub fn step<I>(
        &mut self,
        start: bool,
        input: &I,
        output: &mut Ram<P::Output>,
    ) -> QmlpResult<bool>
    where
        I: ReadPort<i8> + ?Sized,
    {
        self.done = false;
        if start && self.state != LayerState::Idle {
            log::trace!("layer: start ignored in {:?}", self.state);
        }

        match self.state {
            LayerState::Idle => {
                if start {
                    self.check_ports(input, output)?;
                    self.neuron = 0;
                    self.state = LayerState::LoadBias;
                    log::trace!("layer {}x{}: start", self.in_dim(), self.out_dim());
                }
            }
            LayerState::LoadBias => {
                self.acc = self.tables.biases.read(self.neuron)?;
                self.input_index = 0;
                self.state = LayerState::Mac;
            }
            LayerState::Mac => {
                let k = self.input_index;
                let w = self.tables.weight(self.neuron, k)? as i32;
                let x = input.read(k)? as i32;
                // i8×i8 は i32 に収まる。加算のみ折り返す
                self.acc = self.acc.wrapping_add(w * x);
                self.input_index += 1;
                if self.input_index == self.tables.in_dim {
                    self.state = LayerState::Write;
                }
            }
            LayerState::Write => {
                let y = self.policy.requantize(self.acc);
                output.write(self.neuron, y, true)?;
                if self.neuron + 1 == self.tables.out_dim {
                    self.state = LayerState::Done;
                } else {
                    self.neuron += 1;
                    self.state = LayerState::LoadBias;
                }
            }
            LayerState::Done => {
                self.done = true;
                self.state = LayerState::Idle;
                log::trace!("layer {}x{}: done", self.in_dim(), self.out_dim());
            }
        }

        output.latch();
        Ok(self.done)
    }

    /// start を与えて done まで回す
    ///
    /// 戻り値は消費したステップ数。
    pub fn run_to_completion<I>(
        &mut self,
        input: &I,
        output: &mut Ram<P::Output>,
    ) -> QmlpResult<usize>
    where
        I: ReadPort<i8> + ?Sized,
    {
        let mut steps = 0;
        let mut start = true;
        loop {
            steps += 1;
            if self.step(start, input, output)? {
                return Ok(steps);
            }
            start = false;
        }
    }

    fn check_ports<I>(&self, input: &I, output: &Ram<P::Output>) -> QmlpResult<()>
    where
        I: ReadPort<i8> + ?Sized,
    {
        if input.len() != self.tables.in_dim {
            return Err(QmlpError::DimensionMismatch {
                table: "layer input",
                expected: self.tables.in_dim,
                actual: input.len(),
            });
        }
        if output.len() != self.tables.out_dim {
            return Err(QmlpError::DimensionMismatch {
                table: output.name(),
                expected: self.tables.out_dim,
                actual: output.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::{PassThrough, Quantized, Shift};

    fn tables(in_dim: usize, out_dim: usize, w: Vec<i8>, b: Vec<i32>) -> LayerTables {
        LayerTables::new(in_dim, out_dim, Rom::new("w", w), Rom::new("b", b)).unwrap()
    }

    #[test]
    fn test_layer_tables_validation() {
        let err = LayerTables::new(2, 2, Rom::new("w1", vec![0i8; 3]), Rom::new("b1", vec![0; 2]))
            .unwrap_err();
        assert!(matches!(
            err,
            QmlpError::DimensionMismatch { table: "w1", expected: 4, actual: 3 }
        ));

        let err = LayerTables::new(2, 2, Rom::new("w1", vec![0i8; 4]), Rom::new("b1", vec![0; 1]))
            .unwrap_err();
        assert!(matches!(
            err,
            QmlpError::DimensionMismatch { table: "b1", expected: 2, actual: 1 }
        ));

        let err = LayerTables::new(0, 2, Rom::new("w1", vec![]), Rom::new("b1", vec![0; 2]))
            .unwrap_err();
        assert!(matches!(err, QmlpError::ZeroDimension("w1")));

        let huge = usize::MAX / 2 + 1;
        let err = LayerTables::new(huge, 2, Rom::new("w1", vec![]), Rom::new("b1", vec![0; 2]))
            .unwrap_err();
        assert!(matches!(err, QmlpError::TableTooLarge { table: "w1", rows: 2, .. }));
    }

    #[test]
    fn test_quantized_layer_end_to_end() {
        // acc = 5 + 3*4 + (-2)*10 = -3, -3 >> 1 = -2, ReLU → 0
        let mut engine = LayerEngine::new(
            tables(2, 1, vec![3, -2], vec![5]),
            Quantized::new(Shift::new(1).unwrap(), true),
        );
        let input = Rom::new("x", vec![4i8, 10]);
        let mut output = Ram::new("hidden", 1);
        output.write(0, 99, true).unwrap();
        output.latch();

        let steps = engine.run_to_completion(&input, &mut output).unwrap();
        assert_eq!(steps, LayerEngine::<Quantized>::pass_steps(2, 1));
        assert_eq!(output.as_slice(), &[0]);
        assert!(engine.is_idle());
    }

    #[test]
    fn test_pass_through_layer_wraps() {
        // 127*127 を 2 回足すとバイアス i32::MAX から折り返す
        let mut engine = LayerEngine::new(
            tables(2, 2, vec![127, 127, -1, 0], vec![i32::MAX, 7]),
            PassThrough,
        );
        let input = Rom::new("x", vec![127i8, 127]);
        let mut output = Ram::new("logits", 2);
        engine.run_to_completion(&input, &mut output).unwrap();

        let expected0 = i32::MAX.wrapping_add(127 * 127).wrapping_add(127 * 127);
        assert_eq!(output.as_slice(), &[expected0, 7 - 127]);
        assert!(expected0 < 0);
    }

    #[test]
    fn test_step_count_and_single_done_pulse() {
        let (in_dim, out_dim) = (3, 4);
        let mut engine = LayerEngine::new(
            tables(in_dim, out_dim, vec![1; 12], vec![0; 4]),
            PassThrough,
        );
        let input = Rom::new("x", vec![1i8, 2, 3]);
        let mut output = Ram::new("y", out_dim);

        let mut done_steps = Vec::new();
        for step in 0..100 {
            if engine.step(step == 0, &input, &mut output).unwrap() {
                done_steps.push(step + 1);
            }
        }
        assert_eq!(done_steps, vec![out_dim * (in_dim + 2) + PASS_OVERHEAD_STEPS]);
        assert_eq!(output.as_slice(), &[6, 6, 6, 6]);
        assert!(!engine.done());
    }

    #[test]
    fn test_start_ignored_while_busy() {
        let mut engine = LayerEngine::new(tables(2, 2, vec![1, 1, 2, 2], vec![0, 0]), PassThrough);
        let input = Rom::new("x", vec![1i8, 1]);
        let mut output = Ram::new("y", 2);

        engine.step(true, &input, &mut output).unwrap();
        engine.step(false, &input, &mut output).unwrap(); // LOAD_BIAS j=0
        engine.step(false, &input, &mut output).unwrap(); // MAC k=0
        assert_eq!(engine.state(), LayerState::Mac);
        // 計算中の start は無視され、カウンタも戻らない
        engine.step(true, &input, &mut output).unwrap();
        assert_eq!(engine.state(), LayerState::Write);
        assert_eq!(engine.neuron(), 0);

        let mut steps = 4;
        while !engine.step(true, &input, &mut output).unwrap() {
            steps += 1;
        }
        assert_eq!(steps + 1, LayerEngine::<PassThrough>::pass_steps(2, 2));
        assert_eq!(output.as_slice(), &[2, 4]);
    }

    #[test]
    fn test_reset_mid_neuron_keeps_completed_writes() {
        let mut engine = LayerEngine::new(
            tables(2, 3, vec![1, 1, 2, 2, 3, 3], vec![10, 20, 30]),
            PassThrough,
        );
        let input = Rom::new("x", vec![1i8, 1]);
        let mut output = Ram::new("y", 3);

        // start + ニューロン 0 完了 (4 steps) + ニューロン 1 の LOAD_BIAS, MAC, MAC
        for step in 0..8 {
            engine.step(step == 0, &input, &mut output).unwrap();
        }
        assert_eq!(engine.state(), LayerState::Write);
        assert_eq!(engine.neuron(), 1);
        engine.reset();

        assert_eq!(output.as_slice(), &[12, 0, 0]);
        assert!(engine.is_idle());
        assert_eq!(engine.accumulator(), 0);

        // リセット後は再度 start が必要
        for _ in 0..10 {
            assert!(!engine.step(false, &input, &mut output).unwrap());
        }
        engine.run_to_completion(&input, &mut output).unwrap();
        assert_eq!(output.as_slice(), &[12, 24, 36]);
    }

    #[test]
    fn test_port_size_checked_on_start() {
        let mut engine = LayerEngine::new(tables(2, 1, vec![1, 1], vec![0]), PassThrough);
        let input = Rom::new("x", vec![1i8, 1, 1]);
        let mut output = Ram::new("y", 1);
        let err = engine.step(true, &input, &mut output).unwrap_err();
        assert!(matches!(err, QmlpError::DimensionMismatch { expected: 2, actual: 3, .. }));
        assert!(engine.is_idle());
    }
}
