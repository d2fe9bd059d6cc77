//! エンジン設定（TOML）
//!
//! ```toml
//! mode = "interactive"      # or "free-running"
//! debounce_ticks = 4
//!
//! [network]
//! input_dim = 784
//! hidden_dim = 32
//! num_classes = 10
//! # layer2_input_dim = 32  # 省略時は hidden_dim
//!
//! [quantization]
//! shift1 = 7                # 省略時は成果物の shift1.txt
//! relu1 = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::QmlpResult;
use crate::input::DEFAULT_DEBOUNCE_TICKS;
use crate::model::{DEFAULT_HIDDEN_DIM, DEFAULT_INPUT_DIM, DEFAULT_NUM_CLASSES, NetworkDims};
use crate::orchestrator::RunMode;
use crate::quantize::Shift;

fn default_true() -> bool {
    true
}

fn default_debounce_ticks() -> u32 {
    DEFAULT_DEBOUNCE_TICKS
}

/// `[network]` セクション
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSection {
    #[serde(default = "NetworkSection::default_input_dim")]
    pub input_dim: usize,
    #[serde(default = "NetworkSection::default_hidden_dim")]
    pub hidden_dim: usize,
    #[serde(default)]
    pub layer2_input_dim: Option<usize>,
    #[serde(default = "NetworkSection::default_num_classes")]
    pub num_classes: usize,
}

impl NetworkSection {
    fn default_input_dim() -> usize {
        DEFAULT_INPUT_DIM
    }

    fn default_hidden_dim() -> usize {
        DEFAULT_HIDDEN_DIM
    }

    fn default_num_classes() -> usize {
        DEFAULT_NUM_CLASSES
    }

    /// 次元を検証して返す
    pub fn dims(&self) -> QmlpResult<NetworkDims> {
        let dims = NetworkDims {
            input_dim: self.input_dim,
            hidden_dim: self.hidden_dim,
            layer2_input_dim: self.layer2_input_dim.unwrap_or(self.hidden_dim),
            num_classes: self.num_classes,
        };
        dims.validate()?;
        Ok(dims)
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            input_dim: DEFAULT_INPUT_DIM,
            hidden_dim: DEFAULT_HIDDEN_DIM,
            layer2_input_dim: None,
            num_classes: DEFAULT_NUM_CLASSES,
        }
    }
}

/// `[quantization]` セクション
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantizationSection {
    #[serde(default)]
    pub shift1: Option<u32>,
    #[serde(default = "default_true")]
    pub relu1: bool,
}

impl Default for QuantizationSection {
    fn default() -> Self {
        Self {
            shift1: None,
            relu1: true,
        }
    }
}

/// エンジン設定
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default = "default_debounce_ticks")]
    pub debounce_ticks: u32,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub quantization: QuantizationSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            debounce_ticks: DEFAULT_DEBOUNCE_TICKS,
            network: NetworkSection::default(),
            quantization: QuantizationSection::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> QmlpResult<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> QmlpResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 次元とシフト量を検証
    pub fn validate(&self) -> QmlpResult<()> {
        self.network.dims()?;
        self.shift1()?;
        Ok(())
    }

    pub fn dims(&self) -> QmlpResult<NetworkDims> {
        self.network.dims()
    }

    /// 設定ファイルで指定されたシフト量（未指定なら `None`）
    pub fn shift1(&self) -> QmlpResult<Option<Shift>> {
        self.quantization.shift1.map(Shift::new).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QmlpError;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.dims().unwrap(), NetworkDims::default());
        assert_eq!(config.mode, RunMode::Interactive);
        assert_eq!(config.shift1().unwrap(), None);
        assert!(config.quantization.relu1);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
mode = "free-running"
debounce_ticks = 8

[network]
input_dim = 16
hidden_dim = 4
num_classes = 3

[quantization]
shift1 = 5
relu1 = false
"#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.mode, RunMode::FreeRunning);
        assert_eq!(config.debounce_ticks, 8);
        assert_eq!(config.dims().unwrap(), NetworkDims::new(16, 4, 3));
        assert_eq!(config.shift1().unwrap(), Some(Shift::new(5).unwrap()));
        assert!(!config.quantization.relu1);
    }

    #[test]
    fn test_invalid_configs_fail_fast() {
        let err = EngineConfig::from_toml_str("[network]\nhidden_dim = 4\nlayer2_input_dim = 5\n")
            .unwrap_err();
        assert!(matches!(err, QmlpError::LayerWidthMismatch { .. }));

        let err = EngineConfig::from_toml_str("[quantization]\nshift1 = 64\n").unwrap_err();
        assert!(matches!(err, QmlpError::InvalidShift(64)));

        let err = EngineConfig::from_toml_str("unknown_key = 1\n").unwrap_err();
        assert!(matches!(err, QmlpError::Config(_)));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_overflowing_dims_rejected() {
        let text = "[network]\ninput_dim = 8589934592\nhidden_dim = 8589934592\nnum_classes = 1\n";
        let err = EngineConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, QmlpError::TableTooLarge { table: "W1", .. }));
    }
}
