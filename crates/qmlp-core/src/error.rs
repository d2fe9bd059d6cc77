//! Error types for the quantized MLP engine
//!
//! 実行時の演算（MAC の折り返し・飽和）はエラーにならない。
//! エラーになるのは構築時の次元不整合、ポートの範囲外アクセス、
//! テーブルファイルの読み込み失敗のみ。

/// Engine-specific errors
#[derive(thiserror::Error, Debug)]
pub enum QmlpError {
    /// Table size does not match the declared layer dimensions
    #[error("{table}: dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    /// OUT x IN does not fit in usize
    #[error("{table}: {rows}x{cols} elements overflow the address space")]
    TableTooLarge {
        table: &'static str,
        rows: usize,
        cols: usize,
    },

    /// A layer dimension (IN / OUT) was zero
    #[error("{0}: dimension must be non-zero")]
    ZeroDimension(&'static str),

    /// Layer 2 input width differs from the hidden width of layer 1
    #[error("layer width mismatch: hidden_dim={hidden}, layer2_input_dim={layer2_input}")]
    LayerWidthMismatch { hidden: usize, layer2_input: usize },

    /// Shift amount outside of 0..=63
    #[error("invalid shift amount: {0} (expected 0..=63)")]
    InvalidShift(u32),

    /// Read or write port addressed outside of its table
    #[error("{port}: address {address} out of range (len {len})")]
    AddressOutOfRange {
        port: &'static str,
        address: usize,
        len: usize,
    },

    /// Operation requires the engine to be idle
    #[error("engine is busy (state {0})")]
    Busy(&'static str),

    /// Argmax over an empty vector
    #[error("argmax of an empty vector")]
    EmptyLogits,

    /// Malformed hex memory file
    #[error("line {line}: invalid token {token:?}: {reason}")]
    MemParse {
        line: usize,
        token: String,
        reason: &'static str,
    },

    /// Required artifact file not present
    #[error("artifact not found: {0}")]
    ArtifactMissing(String),

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

/// Result type for engine operations
pub type QmlpResult<T> = Result<T, QmlpError>;
