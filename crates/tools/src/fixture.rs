//! 乱数による検証用モデルの生成
//!
//! 学習済みの重みがなくても成果物一式を作れるように、シード固定の乱数で
//! 重み・バイアス・入力を生成し、参照実装で golden の予測クラスを付ける。

use qmlp_core::{ArtifactSet, NetworkDims, QmlpResult, QuantizedMlp, Shift, forward};
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

/// 生成パラメータ
#[derive(Debug, Clone, Copy)]
pub struct FixtureParams {
    pub dims: NetworkDims,
    pub shift1: Shift,
    /// バイアス 1 の絶対値の上限
    pub bias1_range: i32,
    /// バイアス 2 の絶対値の上限
    pub bias2_range: i32,
}

impl FixtureParams {
    pub fn new(dims: NetworkDims, shift1: Shift) -> Self {
        Self {
            dims,
            shift1,
            bias1_range: 20_000,
            bias2_range: 2_000,
        }
    }
}

fn random_i8s(rng: &mut Xoshiro256PlusPlus, n: usize) -> Vec<i8> {
    (0..n).map(|_| rng.random::<i8>()).collect()
}

fn random_i32s(rng: &mut Xoshiro256PlusPlus, n: usize, range: i32) -> Vec<i32> {
    let range = range.max(1);
    (0..n).map(|_| rng.random_range(-range..range)).collect()
}

/// シードから成果物一式を作る
///
/// 入力は 0..=127（画素値を 1 ビット右シフトした範囲）に揃える。
/// ラベルは持たないので `sample_label` は `None`。
pub fn generate(seed: u64, params: &FixtureParams) -> QmlpResult<ArtifactSet> {
    let dims = params.dims;
    dims.validate()?;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    let w1 = random_i8s(&mut rng, dims.w1_len());
    let b1 = random_i32s(&mut rng, dims.hidden_dim, params.bias1_range);
    let w2 = random_i8s(&mut rng, dims.w2_len());
    let b2 = random_i32s(&mut rng, dims.num_classes, params.bias2_range);
    let sample_input: Vec<i8> =
        (0..dims.input_dim).map(|_| rng.random_range(0..=i8::MAX)).collect();

    let model = QuantizedMlp::new(dims, w1, b1, w2, b2, params.shift1)?;
    let golden = forward(&model, &sample_input)?.predicted;
    log::debug!("generated fixture seed={seed} golden={golden}");

    Ok(ArtifactSet {
        model,
        sample_input,
        sample_label: None,
        golden_pred: Some(golden),
    })
}
