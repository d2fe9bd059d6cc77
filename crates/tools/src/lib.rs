//! qmlp 用の CLI ツール群の共通部分

pub mod fixture;
pub mod logging;
pub mod report;
