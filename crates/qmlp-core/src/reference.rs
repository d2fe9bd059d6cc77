//! 一括計算による参照推論
//!
//! ステップ駆動のエンジンと同じ整数演算を行列演算の形で一度に行う。
//! エンジンの出力はこれと bit-exact に一致しなければならない。

use crate::argmax::argmax;
use crate::error::QmlpResult;
use crate::layer::LayerTables;
use crate::model::QuantizedMlp;
use crate::quantize::Requantize;

/// 参照推論の中間値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTrace {
    /// 層 1 のアキュムレータ（再量子化前）
    pub acc1: Vec<i32>,
    /// 層 1 の出力
    pub hidden: Vec<i8>,
    /// 層 2 の出力（ロジット）
    pub logits: Vec<i32>,
    /// 予測クラス
    pub predicted: usize,
}

/// `b[j] + Σ_k w[j,k] * x[k]`（i32 で折り返し）
pub fn affine(tables: &LayerTables, input: &[i8]) -> Vec<i32> {
    let in_dim = tables.in_dim();
    let weights = tables.weights().as_slice();
    tables
        .biases()
        .as_slice()
        .iter()
        .zip(weights.chunks_exact(in_dim))
        .map(|(&bias, row)| {
            row.iter()
                .zip(input)
                .fold(bias, |acc, (&w, &x)| acc.wrapping_add(w as i32 * x as i32))
        })
        .collect()
}

/// 2 層分の推論を一括で行う
pub fn forward(model: &QuantizedMlp, input: &[i8]) -> QmlpResult<ForwardTrace> {
    let input = model.input_rom(input.to_vec())?;
    let policy = model.layer1_policy();

    let acc1 = affine(model.layer1(), input.as_slice());
    let hidden: Vec<i8> = acc1.iter().map(|&acc| policy.requantize(acc)).collect();
    let logits = affine(model.layer2(), &hidden);
    let predicted = argmax(&logits)?;

    Ok(ForwardTrace {
        acc1,
        hidden,
        logits,
        predicted,
    })
}
