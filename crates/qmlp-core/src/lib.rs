//! 量子化 2 層 MLP 推論エンジン
//!
//! i8 活性・i8 重み・i32 アキュムレータの固定小数点演算を、
//! 1 ステップ 1 演算の逐次ステートマシンとして bit-exact に再現する。
//!
//! # 構成
//!
//! ```text
//! Orchestrator
//!   ├─ LayerEngine<Quantized>    (層 1: >>> shift1 → sat8 → ReLU)
//!   ├─ LayerEngine<PassThrough>  (層 2: i32 ロジット、飽和なし)
//!   └─ ArgmaxReducer             (同値は先勝ち)
//! ```
//!
//! 呼び出し側が `step()` を 1 tick ごとに呼ぶ。暗黙のクロックやスレッドはない。
//!
//! # 使用例
//!
//! ```
//! use qmlp_core::{NetworkDims, Orchestrator, QuantizedMlp, RunMode, Shift};
//!
//! let model = QuantizedMlp::new(
//!     NetworkDims::new(2, 1, 2),
//!     vec![3, -2],
//!     vec![5],
//!     vec![1, -1],
//!     vec![0, 0],
//!     Shift::new(1)?,
//! )?;
//! let mut orch = Orchestrator::new(&model, vec![4, 10], RunMode::Interactive)?;
//! let class = orch.run_inference()?;
//! assert_eq!(orch.hidden(), &[0]);
//! assert_eq!(class, 0);
//! # Ok::<(), qmlp_core::QmlpError>(())
//! ```

pub mod argmax;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod input;
pub mod layer;
pub mod mem;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod quantize;
pub mod reference;

pub use argmax::{ArgmaxReducer, argmax};
pub use artifacts::ArtifactSet;
pub use config::EngineConfig;
pub use error::{QmlpError, QmlpResult};
pub use input::{ButtonConditioner, ConditionedOrchestrator};
pub use layer::{LayerEngine, LayerState, LayerTables};
pub use memory::{Ram, ReadPort, Rom};
pub use model::{NetworkDims, QuantizedMlp};
pub use orchestrator::{Orchestrator, OrchestratorState, RunMode};
pub use quantize::{PassThrough, Quantized, Requantize, Shift, quantize};
pub use reference::{ForwardTrace, forward};
