//! ロガー初期化

use std::io::Write;

/// env_logger を初期化する
///
/// `RUST_LOG` があればそれを優先し、なければ `debug` フラグで info / debug を切り替える。
/// 出力は stderr（stdout は結果出力用に空けておく）。
pub fn init_logger(debug: bool) {
    let log_level = if debug { "debug" } else { "info" };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );

    builder
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Stderr);

    // テストなどで二重初期化されても落とさない
    let _ = builder.try_init();
}
