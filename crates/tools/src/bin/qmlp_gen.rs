//! 検証用成果物の生成ツール
//!
//! シード固定の乱数でモデルと入力を作り、学習スクリプトと同じ形式で書き出す。
//! golden_pred_int32.txt には参照実装の予測クラスを書く。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use qmlp_core::model::{DEFAULT_HIDDEN_DIM, DEFAULT_INPUT_DIM, DEFAULT_NUM_CLASSES};
use qmlp_core::{NetworkDims, Shift};
use tools::fixture::{FixtureParams, generate};
use tools::logging::init_logger;

#[derive(Parser, Debug)]
#[command(name = "qmlp_gen")]
#[command(about = "乱数で量子化 MLP の成果物一式を生成する")]
struct Cli {
    /// 出力ディレクトリ
    #[arg(long)]
    out: PathBuf,

    /// 乱数シード
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// 入力次元
    #[arg(long, default_value_t = DEFAULT_INPUT_DIM)]
    input_dim: usize,

    /// 隠れ層の幅
    #[arg(long, default_value_t = DEFAULT_HIDDEN_DIM)]
    hidden_dim: usize,

    /// クラス数
    #[arg(long, default_value_t = DEFAULT_NUM_CLASSES)]
    num_classes: usize,

    /// 層 1 のシフト量
    #[arg(long, default_value_t = 9)]
    shift1: u32,

    /// テーブルを `.mem.gz` で書き出す
    #[arg(long, default_value_t = false)]
    gzip: bool,

    /// デバッグログを有効にする
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.debug);

    let dims = NetworkDims::new(cli.input_dim, cli.hidden_dim, cli.num_classes);
    let params = FixtureParams::new(dims, Shift::new(cli.shift1)?);
    let set = generate(cli.seed, &params)?;
    set.save_with(&cli.out, cli.gzip)
        .with_context(|| format!("書き出しに失敗しました: {}", cli.out.display()))?;

    log::info!(
        "wrote {}x{}x{} artifacts to {} (seed={}, golden={:?})",
        dims.input_dim,
        dims.hidden_dim,
        dims.num_classes,
        cli.out.display(),
        cli.seed,
        set.golden_pred
    );
    Ok(())
}
