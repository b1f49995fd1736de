use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const CRATE_TARGET: &str = "loan_remediation_stack";

/// 預設的過濾規則，`RUST_LOG` 有設定時以環境變數為準
pub fn default_directive(verbose: bool) -> String {
    if verbose {
        format!("{}=debug,info", CRATE_TARGET)
    } else {
        format!("{}=info", CRATE_TARGET)
    }
}

/// 初始化日誌：終端機用 compact 格式，CI 部署工作用 JSON 行
pub fn init_logger(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let base = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let format: Box<dyn Layer<Registry> + Send + Sync> = if json {
        base.json().boxed()
    } else {
        base.compact().boxed()
    };

    tracing_subscriber::registry().with(format).with(filter).init();
}

/// 依 CLI 參數初始化日誌
#[cfg(feature = "cli")]
pub fn init_from_cli(config: &crate::config::CliConfig) {
    init_logger(config.verbose, config.json_logs);
}
