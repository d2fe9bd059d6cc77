//! Argmax（最大値のインデックス）
//!
//! 比較は厳密な `>` のみで更新するため、同値の場合は最も小さいインデックスが勝つ。

use crate::error::{QmlpError, QmlpResult};

/// 最大値のインデックスを返す（同値は先勝ち）
pub fn argmax(values: &[i32]) -> QmlpResult<usize> {
    let (&first, rest) = values.split_first().ok_or(QmlpError::EmptyLogits)?;
    let mut best_index = 0;
    let mut best_value = first;
    for (offset, &v) in rest.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best_index = offset + 1;
        }
    }
    Ok(best_index)
}

/// 逐次 argmax
///
/// 1 ステップにつき 1 回だけ比較する。`len - 1` ステップで完了し、
/// 結果は `argmax` と一致する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgmaxReducer {
    /// 次に比較するインデックス
    cursor: usize,
    len: usize,
    best_index: usize,
    best_value: i32,
}

impl ArgmaxReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 走査を開始（`values[0]` を暫定最大とする）
    pub fn begin(&mut self, values: &[i32]) -> QmlpResult<()> {
        let &first = values.first().ok_or(QmlpError::EmptyLogits)?;
        self.cursor = 1;
        self.len = values.len();
        self.best_index = 0;
        self.best_value = first;
        Ok(())
    }

    /// 比較を 1 回行う
    ///
    /// 戻り値は走査が終わったかどうか。`values` は `begin` と同じものを渡す。
    pub fn step(&mut self, values: &[i32]) -> QmlpResult<bool> {
        if self.is_finished() {
            return Ok(true);
        }
        let v = *values.get(self.cursor).ok_or(QmlpError::AddressOutOfRange {
            port: "logits",
            address: self.cursor,
            len: values.len(),
        })?;
        if v > self.best_value {
            self.best_value = v;
            self.best_index = self.cursor;
        }
        self.cursor += 1;
        Ok(self.is_finished())
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.len
    }

    /// 比較が残っている回数
    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.cursor)
    }

    pub fn best_index(&self) -> usize {
        self.best_index
    }

    pub fn best_value(&self) -> i32 {
        self.best_value
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
