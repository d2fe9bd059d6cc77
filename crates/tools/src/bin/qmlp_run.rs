//! 量子化 MLP 推論ツール
//!
//! 成果物ディレクトリ（W1.mem, b1.mem, W2.mem, b2.mem, shift1.txt, sample_input.mem）を読み込み、
//! サイクル単位のエンジンで推論して予測クラスとサイクル数を出力する。
//! 参照実装・golden の予測と食い違った場合はエラー終了する。

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use qmlp_core::{ArtifactSet, EngineConfig, RunMode, Shift};
use tools::logging::init_logger;
use tools::report::run_engine;

#[derive(Parser, Debug)]
#[command(name = "qmlp_run")]
#[command(about = "量子化 MLP の成果物を読み込んでサイクル単位で推論する")]
struct Cli {
    /// 成果物ディレクトリ
    #[arg(long)]
    artifacts: PathBuf,

    /// エンジン設定ファイル（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 起動モード（interactive / free-running）。設定ファイルより優先
    #[arg(long)]
    mode: Option<RunMode>,

    /// 層 1 のシフト量。shift1.txt と設定ファイルより優先
    #[arg(long)]
    shift1: Option<u32>,

    /// 推論の回数
    #[arg(long, default_value_t = 1)]
    runs: u64,

    /// 結果を JSON で標準出力に書く
    #[arg(long, default_value_t = false)]
    json: bool,

    /// デバッグログを有効にする
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.debug);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if cli.runs == 0 {
        bail!("--runs は 1 以上を指定してください");
    }

    let mode = cli.mode.unwrap_or(config.mode);
    let shift1 = match cli.shift1 {
        Some(shift) => Some(Shift::new(shift)?),
        None => config.shift1()?,
    };
    let dims = config.dims()?;

    let mut set = ArtifactSet::load(&cli.artifacts, dims, shift1)
        .with_context(|| format!("成果物を読み込めません: {}", cli.artifacts.display()))?;
    set.model = set.model.with_relu(config.quantization.relu1);

    let report = run_engine(&set, mode, config.debounce_ticks, cli.runs)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for record in &report.runs {
            println!("run {}: class={} cycles={}", record.run, record.predicted, record.cycles);
        }
        eprintln!("参照実装の予測: {}", report.reference_pred);
        if let Some(golden) = report.golden_pred {
            eprintln!("golden の予測: {golden}");
        }
        if let Some(label) = report.sample_label {
            eprintln!("正解ラベル: {label}");
        }
    }

    let mismatches = report.mismatches();
    if !mismatches.is_empty() {
        for m in &mismatches {
            log::error!("{m}");
        }
        bail!("エンジンの結果が参照と一致しません（{}件）", mismatches.len());
    }
    if report.runs.len() as u64 != cli.runs {
        bail!("{} 回中 {} 回しか推論が完了しませんでした", cli.runs, report.runs.len());
    }
    Ok(())
}
