//! 再量子化（シフト + 飽和 + ReLU）
//!
//! - `quantize`: i32 アキュムレータを算術右シフトし、i8 に飽和させ、必要なら ReLU をかける
//! - `Requantize`: 層の出力ポリシー。`Quantized`（i8 出力）と `PassThrough`（i32 そのまま）
//!
//! 層 1 は `Quantized`、層 2（ロジット層）は `PassThrough` を使う。
//! ロジット層はオーバーフローしても飽和させない（折り返した値がそのまま argmax に渡る）。

use crate::error::{QmlpError, QmlpResult};

/// シフト量（0..=63）
///
/// 6bit のシフト量レジスタに対応する。32 以上のシフトは符号ビットで埋まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Shift(u8);

impl Shift {
    /// 最大シフト量
    pub const MAX: u32 = 63;

    /// シフト量から生成（範囲外はエラー）
    pub fn new(amount: u32) -> QmlpResult<Self> {
        if amount > Self::MAX {
            return Err(QmlpError::InvalidShift(amount));
        }
        Ok(Shift(amount as u8))
    }

    /// シフト量
    #[inline]
    pub const fn get(self) -> u32 {
        self.0 as u32
    }
}

/// 32bit 符号拡張シフタ相当の算術右シフト
///
/// `i32 >> n` は n >= 32 で panic するため、31 に丸める（結果は 0 か -1）。
#[inline]
pub fn arithmetic_shift_right(acc: i32, shift: Shift) -> i32 {
    acc >> shift.get().min(31)
}

/// i8 の範囲 [-128, 127] に飽和
#[inline]
pub fn saturate_i8(value: i32) -> i8 {
    value.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// 再量子化
///
/// 1. 算術右シフト
/// 2. i8 に飽和
/// 3. `relu` なら負値を 0 に
#[inline]
pub fn quantize(acc: i32, shift: Shift, relu: bool) -> i8 {
    let saturated = saturate_i8(arithmetic_shift_right(acc, shift));
    if relu && saturated < 0 { 0 } else { saturated }
}

/// 層の出力ポリシー
///
/// 層エンジンは WRITE ステートでアキュムレータをこのポリシーに通して出力 RAM に書く。
pub trait Requantize {
    /// 出力ベクトルの要素型
    type Output: Copy + Default + std::fmt::Debug;

    /// アキュムレータを出力値に変換
    fn requantize(&self, acc: i32) -> Self::Output;
}

/// シフト + 飽和 (+ ReLU) して i8 を出力する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    pub shift: Shift,
    pub relu: bool,
}

impl Quantized {
    pub fn new(shift: Shift, relu: bool) -> Self {
        Self { shift, relu }
    }
}

impl Requantize for Quantized {
    type Output = i8;

    #[inline]
    fn requantize(&self, acc: i32) -> i8 {
        quantize(acc, self.shift, self.relu)
    }
}

/// アキュムレータをそのまま i32 で出力する（飽和なし）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassThrough;

impl Requantize for PassThrough {
    type Output = i32;

    #[inline]
    fn requantize(&self, acc: i32) -> i32 {
        acc
    }
}
