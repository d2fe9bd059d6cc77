//! ネットワーク定義（次元と重みテーブル）
//!
//! ```text
//! input [IN1] (i8)
//!     ↓  W1 [H1×IN1], b1 [H1]
//! acc1 [H1] (i32) → >>> shift1 → sat8 → ReLU
//!     ↓
//! hidden [H1] (i8)
//!     ↓  W2 [OUT2×IN2], b2 [OUT2]   (IN2 == H1)
//! logits [OUT2] (i32, 飽和なし)
//!     ↓
//! argmax → class
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{QmlpError, QmlpResult};
use crate::layer::LayerTables;
use crate::memory::Rom;
use crate::quantize::{PassThrough, Quantized, Shift};

/// 入力次元（28×28 の画像を平坦化）
pub const DEFAULT_INPUT_DIM: usize = 28 * 28;
/// 隠れ層の幅
pub const DEFAULT_HIDDEN_DIM: usize = 32;
/// クラス数
pub const DEFAULT_NUM_CLASSES: usize = 10;

/// ネットワークの次元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDims {
    /// IN1
    pub input_dim: usize,
    /// H1
    pub hidden_dim: usize,
    /// IN2（H1 と一致している必要がある）
    pub layer2_input_dim: usize,
    /// OUT2
    pub num_classes: usize,
}

impl Default for NetworkDims {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_DIM, DEFAULT_HIDDEN_DIM, DEFAULT_NUM_CLASSES)
    }
}

impl NetworkDims {
    /// IN2 = H1 として生成
    pub const fn new(input_dim: usize, hidden_dim: usize, num_classes: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
            layer2_input_dim: hidden_dim,
            num_classes,
        }
    }

    /// 次元の整合性を検証
    pub fn validate(&self) -> QmlpResult<()> {
        if self.input_dim == 0 {
            return Err(QmlpError::ZeroDimension("input_dim"));
        }
        if self.hidden_dim == 0 {
            return Err(QmlpError::ZeroDimension("hidden_dim"));
        }
        if self.num_classes == 0 {
            return Err(QmlpError::ZeroDimension("num_classes"));
        }
        if self.layer2_input_dim != self.hidden_dim {
            return Err(QmlpError::LayerWidthMismatch {
                hidden: self.hidden_dim,
                layer2_input: self.layer2_input_dim,
            });
        }
        if self.hidden_dim.checked_mul(self.input_dim).is_none() {
            return Err(QmlpError::TableTooLarge {
                table: "W1",
                rows: self.hidden_dim,
                cols: self.input_dim,
            });
        }
        if self.num_classes.checked_mul(self.layer2_input_dim).is_none() {
            return Err(QmlpError::TableTooLarge {
                table: "W2",
                rows: self.num_classes,
                cols: self.layer2_input_dim,
            });
        }
        Ok(())
    }

    /// W1 の要素数（`validate` 前は usize::MAX で頭打ち）
    pub const fn w1_len(&self) -> usize {
        self.hidden_dim.saturating_mul(self.input_dim)
    }

    /// W2 の要素数
    pub const fn w2_len(&self) -> usize {
        self.num_classes.saturating_mul(self.layer2_input_dim)
    }
}

/// 量子化済み 2 層 MLP
///
/// 構築時にすべてのテーブルサイズを検証する。以降は読み出し専用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedMlp {
    dims: NetworkDims,
    layer1: LayerTables,
    layer2: LayerTables,
    shift1: Shift,
    relu1: bool,
}

impl QuantizedMlp {
    pub fn new(
        dims: NetworkDims,
        w1: Vec<i8>,
        b1: Vec<i32>,
        w2: Vec<i8>,
        b2: Vec<i32>,
        shift1: Shift,
    ) -> QmlpResult<Self> {
        dims.validate()?;
        let layer1 = LayerTables::new(
            dims.input_dim,
            dims.hidden_dim,
            Rom::new("W1", w1),
            Rom::new("b1", b1),
        )?;
        let layer2 = LayerTables::new(
            dims.layer2_input_dim,
            dims.num_classes,
            Rom::new("W2", w2),
            Rom::new("b2", b2),
        )?;
        Ok(Self {
            dims,
            layer1,
            layer2,
            shift1,
            relu1: true,
        })
    }

    /// 層 1 の ReLU を切り替える（既定は有効）
    pub fn with_relu(mut self, relu: bool) -> Self {
        self.relu1 = relu;
        self
    }

    pub fn dims(&self) -> NetworkDims {
        self.dims
    }

    pub fn layer1(&self) -> &LayerTables {
        &self.layer1
    }

    pub fn layer2(&self) -> &LayerTables {
        &self.layer2
    }

    pub fn shift1(&self) -> Shift {
        self.shift1
    }

    pub fn relu1(&self) -> bool {
        self.relu1
    }

    /// 層 1 の出力ポリシー
    pub fn layer1_policy(&self) -> Quantized {
        Quantized::new(self.shift1, self.relu1)
    }

    /// 層 2 の出力ポリシー
    pub fn layer2_policy(&self) -> PassThrough {
        PassThrough
    }

    /// 入力ベクトルの長さを検証して ROM にする
    pub fn input_rom(&self, input: Vec<i8>) -> QmlpResult<Rom<i8>> {
        Rom::with_len("input", input, self.dims.input_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_dims() -> NetworkDims {
        NetworkDims::new(3, 2, 2)
    }

    #[test]
    fn test_dims_validation() {
        assert!(NetworkDims::default().validate().is_ok());
        assert_eq!(NetworkDims::default().w1_len(), 32 * 784);
        assert!(matches!(
            NetworkDims::new(0, 2, 2).validate(),
            Err(QmlpError::ZeroDimension("input_dim"))
        ));
        let mut dims = tiny_dims();
        dims.layer2_input_dim = 3;
        assert!(matches!(
            dims.validate(),
            Err(QmlpError::LayerWidthMismatch { hidden: 2, layer2_input: 3 })
        ));
    }

    #[test]
    fn test_model_table_sizes_checked() {
        let shift = Shift::new(0).unwrap();
        let build = |w1: usize, b1: usize, w2: usize, b2: usize| {
            let (w1, w2) = (vec![0; w1], vec![0; w2]);
            QuantizedMlp::new(tiny_dims(), w1, vec![0; b1], w2, vec![0; b2], shift)
        };
        assert!(build(6, 2, 4, 2).is_ok());

        let err = build(6, 2, 5, 2).unwrap_err();
        assert!(matches!(
            err,
            QmlpError::DimensionMismatch { table: "W2", expected: 4, actual: 5 }
        ));

        let err = build(6, 3, 4, 2).unwrap_err();
        assert!(matches!(
            err,
            QmlpError::DimensionMismatch { table: "b1", expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn test_overflowing_dims_rejected() {
        let huge = 1usize << (usize::BITS / 2 + 1);
        let dims = NetworkDims::new(huge, huge, 1);
        assert!(matches!(
            dims.validate(),
            Err(QmlpError::TableTooLarge { table: "W1", .. })
        ));
        assert_eq!(dims.w1_len(), usize::MAX);

        let err = QuantizedMlp::new(dims, vec![], vec![], vec![], vec![0], Shift::new(0).unwrap())
            .unwrap_err();
        assert!(matches!(err, QmlpError::TableTooLarge { table: "W1", .. }));

        let dims = NetworkDims::new(1, huge, huge);
        assert!(matches!(
            dims.validate(),
            Err(QmlpError::TableTooLarge { table: "W2", .. })
        ));
    }

    #[test]
    fn test_input_rom_length() {
        let model = QuantizedMlp::new(
            tiny_dims(),
            vec![0; 6],
            vec![0; 2],
            vec![0; 4],
            vec![0; 2],
            Shift::new(0).unwrap(),
        )
        .unwrap();
        assert!(model.input_rom(vec![1, 2, 3]).is_ok());
        assert!(model.input_rom(vec![1, 2]).is_err());
        assert!(model.relu1());
        assert!(!model.clone().with_relu(false).relu1());
    }
}
