use crate::domain::ports::Storage;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "loan-remediation-stack")]
#[command(about = "Assemble and synthesize the loan remediation prediction stacks")]
pub struct CliConfig {
    #[arg(long, default_value = "./cdk.out")]
    pub output_path: String,

    /// Optional TOML deployment file layered over the environment
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, help = "Print the build order without writing templates")]
    pub dry_run: bool,

    #[arg(long, help = "Also pack the assembly into assembly.zip")]
    pub bundle: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("output_path", &self.output_path)?;
        if let Some(config) = &self.config {
            validate_non_empty_string("config", config)?;
        }
        Ok(())
    }
}

/// 本機檔案系統儲存，路徑相對於 `base_path`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        // 確保父目錄存在
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }
}
