//! テーブルメモリとポート
//!
//! - `Rom`: 重み・バイアス・入力ベクトル用の読み出し専用テーブル
//! - `Ram`: 層出力用のテーブル。書き込みは次のステップから見える
//!
//! 範囲外アドレスは `QmlpError::AddressOutOfRange` になる。

use crate::error::{QmlpError, QmlpResult};

/// 読み出しポート
///
/// レイテンシ 0、副作用なしのインデックス参照。
pub trait ReadPort<T: Copy> {
    /// アドレスの値を読む
    fn read(&self, address: usize) -> QmlpResult<T>;

    /// テーブル長
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline]
fn lookup<T: Copy>(data: &[T], port: &'static str, address: usize) -> QmlpResult<T> {
    data.get(address).copied().ok_or(QmlpError::AddressOutOfRange {
        port,
        address,
        len: data.len(),
    })
}

/// 読み出し専用テーブル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom<T> {
    name: &'static str,
    data: Box<[T]>,
}

impl<T: Copy> Rom<T> {
    /// 値の列から生成
    pub fn new(name: &'static str, data: impl Into<Box<[T]>>) -> Self {
        Self {
            name,
            data: data.into(),
        }
    }

    /// 長さを検証して生成
    pub fn with_len(
        name: &'static str,
        data: impl Into<Box<[T]>>,
        expected: usize,
    ) -> QmlpResult<Self> {
        let rom = Self::new(name, data);
        if rom.data.len() != expected {
            return Err(QmlpError::DimensionMismatch {
                table: name,
                expected,
                actual: rom.data.len(),
            });
        }
        Ok(rom)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T: Copy> ReadPort<T> for Rom<T> {
    #[inline]
    fn read(&self, address: usize) -> QmlpResult<T> {
        lookup(&self.data, self.name, address)
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }
}

/// 書き込み可能テーブル（層出力）
///
/// `write` はステージングされ、`latch`（クロックエッジ）で確定する。
/// 同じステップ内の読み出しは確定済みの値を返す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram<T> {
    name: &'static str,
    data: Box<[T]>,
    pending: Option<(usize, T)>,
}

impl<T: Copy + Default> Ram<T> {
    /// ゼロ初期化で生成
    pub fn new(name: &'static str, len: usize) -> Self {
        Self {
            name,
            data: vec![T::default(); len].into_boxed_slice(),
            pending: None,
        }
    }

    /// 書き込みポート
    ///
    /// `enable` が偽なら何もしない。範囲外アドレスは有効時のみエラー。
    pub fn write(&mut self, address: usize, value: T, enable: bool) -> QmlpResult<()> {
        if !enable {
            return Ok(());
        }
        if address >= self.data.len() {
            return Err(QmlpError::AddressOutOfRange {
                port: self.name,
                address,
                len: self.data.len(),
            });
        }
        self.pending = Some((address, value));
        Ok(())
    }

    /// ステージング中の書き込みを確定
    #[inline]
    pub fn latch(&mut self) {
        if let Some((address, value)) = self.pending.take() {
            self.data[address] = value;
        }
    }

    /// 未確定の書き込みを破棄
    #[inline]
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// 全要素をゼロに戻す
    pub fn clear(&mut self) {
        self.data.fill(T::default());
        self.pending = None;
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 確定済みの内容
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.data.to_vec()
    }
}

impl<T: Copy + Default> ReadPort<T> for Ram<T> {
    #[inline]
    fn read(&self, address: usize) -> QmlpResult<T> {
        lookup(&self.data, self.name, address)
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }
}
