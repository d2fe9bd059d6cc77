//! 成果物ディレクトリ（量子化済みテーブル一式）の読み書き
//!
//! | ファイル | 内容 |
//! |---------|------|
//! | `W1.mem` | 層 1 重み（i8、1 行 = 1 ニューロン） |
//! | `b1.mem` | 層 1 バイアス（i32、1 行 1 値） |
//! | `W2.mem` | 層 2 重み |
//! | `b2.mem` | 層 2 バイアス |
//! | `shift1.txt` | 層 1 の右シフト量（10 進） |
//! | `sample_input.mem` | サンプル入力（i8、1 行 1 値） |
//! | `sample_label.txt` | サンプルの正解ラベル（任意） |
//! | `golden_pred_int32.txt` | 量子化演算での予測クラス（任意） |
//!
//! 各 `.mem` は `.mem.gz` でもよい。

use std::path::{Path, PathBuf};

use crate::error::{QmlpError, QmlpResult};
use crate::mem::{load_mem, open_writer, write_mem_rows, write_mem_words};
use crate::model::{NetworkDims, QuantizedMlp};
use crate::quantize::Shift;

pub const W1_FILE: &str = "W1.mem";
pub const B1_FILE: &str = "b1.mem";
pub const W2_FILE: &str = "W2.mem";
pub const B2_FILE: &str = "b2.mem";
pub const SHIFT1_FILE: &str = "shift1.txt";
pub const SHIFT2_FILE: &str = "shift2.txt";
pub const SAMPLE_INPUT_FILE: &str = "sample_input.mem";
pub const SAMPLE_LABEL_FILE: &str = "sample_label.txt";
pub const GOLDEN_PRED_FILE: &str = "golden_pred_int32.txt";

/// 成果物一式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub model: QuantizedMlp,
    pub sample_input: Vec<i8>,
    pub sample_label: Option<usize>,
    pub golden_pred: Option<usize>,
}

/// `name` か `name.gz` を探す
fn resolve(dir: &Path, name: &str) -> Option<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Some(plain);
    }
    let gz = dir.join(format!("{name}.gz"));
    gz.is_file().then_some(gz)
}

fn require(dir: &Path, name: &str) -> QmlpResult<PathBuf> {
    resolve(dir, name)
        .ok_or_else(|| QmlpError::ArtifactMissing(dir.join(name).display().to_string()))
}

/// 10 進整数 1 つだけのテキストファイルを読む
fn read_scalar(path: &Path) -> QmlpResult<u32> {
    let text = std::fs::read_to_string(path)?;
    let token = text.trim();
    token.parse::<u32>().map_err(|_| QmlpError::MemParse {
        line: 1,
        token: token.to_string(),
        reason: "not a non-negative decimal integer",
    })
}

fn read_optional_scalar(dir: &Path, name: &str) -> QmlpResult<Option<usize>> {
    match resolve(dir, name) {
        Some(path) => Ok(Some(read_scalar(&path)? as usize)),
        None => Ok(None),
    }
}

impl ArtifactSet {
    /// ディレクトリから読み込む
    ///
    /// `shift1` を与えた場合は `shift1.txt` より優先する。
    pub fn load<P: AsRef<Path>>(
        dir: P,
        dims: NetworkDims,
        shift1: Option<Shift>,
    ) -> QmlpResult<Self> {
        let dir = dir.as_ref();
        dims.validate()?;

        let w1 = load_mem::<i8, _>(require(dir, W1_FILE)?, dims.w1_len())?;
        let b1 = load_mem::<i32, _>(require(dir, B1_FILE)?, dims.hidden_dim)?;
        let w2 = load_mem::<i8, _>(require(dir, W2_FILE)?, dims.w2_len())?;
        let b2 = load_mem::<i32, _>(require(dir, B2_FILE)?, dims.num_classes)?;

        let shift1 = match shift1 {
            Some(shift) => shift,
            None => Shift::new(read_scalar(&require(dir, SHIFT1_FILE)?)?)?,
        };

        let model = QuantizedMlp::new(dims, w1, b1, w2, b2, shift1)?;

        let sample_input = load_mem::<i8, _>(require(dir, SAMPLE_INPUT_FILE)?, dims.input_dim)?;
        // 長さの検証
        model.input_rom(sample_input.clone())?;

        let sample_label = read_optional_scalar(dir, SAMPLE_LABEL_FILE)?;
        let golden_pred = read_optional_scalar(dir, GOLDEN_PRED_FILE)?;

        log::info!(
            "loaded artifacts from {}: {}x{}x{} shift1={}",
            dir.display(),
            dims.input_dim,
            dims.hidden_dim,
            dims.num_classes,
            shift1.get()
        );

        Ok(Self {
            model,
            sample_input,
            sample_label,
            golden_pred,
        })
    }

    /// ディレクトリに書き出す（存在しなければ作成）
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> QmlpResult<()> {
        self.save_with(dir, false)
    }

    /// `gzip` が真なら `.mem` テーブルを `.mem.gz` で書き出す
    ///
    /// 同じディレクトリに非圧縮の `.mem` が残っていると読み込み時はそちらが優先される。
    pub fn save_with<P: AsRef<Path>>(&self, dir: P, gzip: bool) -> QmlpResult<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let dims = self.model.dims();
        let table_path = |name: &str| {
            if gzip { dir.join(format!("{name}.gz")) } else { dir.join(name) }
        };

        let mut w = open_writer(table_path(W1_FILE))?;
        write_mem_rows(&mut w, self.model.layer1().weights().as_slice(), dims.input_dim)?;
        w.close()?;

        let mut w = open_writer(table_path(B1_FILE))?;
        write_mem_words(&mut w, self.model.layer1().biases().as_slice())?;
        w.close()?;

        let mut w = open_writer(table_path(W2_FILE))?;
        let w2 = self.model.layer2().weights().as_slice();
        write_mem_rows(&mut w, w2, dims.layer2_input_dim)?;
        w.close()?;

        let mut w = open_writer(table_path(B2_FILE))?;
        write_mem_words(&mut w, self.model.layer2().biases().as_slice())?;
        w.close()?;

        let mut w = open_writer(table_path(SAMPLE_INPUT_FILE))?;
        write_mem_words(&mut w, &self.sample_input)?;
        w.close()?;

        std::fs::write(dir.join(SHIFT1_FILE), format!("{}\n", self.model.shift1().get()))?;
        // 層 2 は再量子化しない
        std::fs::write(dir.join(SHIFT2_FILE), "0\n")?;
        if let Some(label) = self.sample_label {
            std::fs::write(dir.join(SAMPLE_LABEL_FILE), format!("{label}\n"))?;
        }
        if let Some(pred) = self.golden_pred {
            std::fs::write(dir.join(GOLDEN_PRED_FILE), format!("{pred}\n"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_set() -> ArtifactSet {
        let model = QuantizedMlp::new(
            NetworkDims::new(2, 2, 3),
            vec![3, -2, 1, 1],
            vec![5, 0],
            vec![1, 0, 0, 1, 2, -1],
            vec![0, 0, -10],
            Shift::new(1).unwrap(),
        )
        .unwrap();
        ArtifactSet {
            model,
            sample_input: vec![4, 10],
            sample_label: Some(1),
            golden_pred: Some(1),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let set = tiny_set();
        set.save(dir.path()).unwrap();

        let w1 = std::fs::read_to_string(dir.path().join(W1_FILE)).unwrap();
        assert_eq!(w1, "03 fe\n01 01\n");

        let loaded = ArtifactSet::load(dir.path(), NetworkDims::new(2, 2, 3), None).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_shift_override_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        tiny_set().save(dir.path()).unwrap();

        let loaded = ArtifactSet::load(
            dir.path(),
            NetworkDims::new(2, 2, 3),
            Some(Shift::new(3).unwrap()),
        )
        .unwrap();
        assert_eq!(loaded.model.shift1().get(), 3);

        std::fs::remove_file(dir.path().join(B2_FILE)).unwrap();
        let err = ArtifactSet::load(dir.path(), NetworkDims::new(2, 2, 3), None).unwrap_err();
        assert!(matches!(err, QmlpError::ArtifactMissing(_)));
    }

    #[test]
    fn test_gzip_tables_load_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let set = tiny_set();
        set.save_with(dir.path(), true).unwrap();

        for name in [W1_FILE, B1_FILE, W2_FILE, B2_FILE, SAMPLE_INPUT_FILE] {
            assert!(!dir.path().join(name).exists(), "{name}");
            let raw = std::fs::read(dir.path().join(format!("{name}.gz"))).unwrap();
            assert_eq!(&raw[..2], &[0x1f, 0x8b], "{name}");
        }

        let loaded = ArtifactSet::load(dir.path(), NetworkDims::new(2, 2, 3), None).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_out_of_range_address_in_table() {
        let dir = tempfile::tempdir().unwrap();
        tiny_set().save(dir.path()).unwrap();
        std::fs::write(dir.path().join(B1_FILE), "@00ffffff 00000001\n").unwrap();

        let err = ArtifactSet::load(dir.path(), NetworkDims::new(2, 2, 3), None).unwrap_err();
        assert!(matches!(err, QmlpError::MemParse { reason: "address out of range", .. }));
    }

    #[test]
    fn test_dimension_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        tiny_set().save(dir.path()).unwrap();
        let err = ArtifactSet::load(dir.path(), NetworkDims::new(3, 2, 3), None).unwrap_err();
        assert!(matches!(err, QmlpError::DimensionMismatch { table: "W1", .. }));
    }
}
