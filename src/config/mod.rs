#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, LocalStorage};

use crate::utils::error::Result;
use crate::utils::validation::{
    validate_account_id, validate_aws_region, validate_non_empty_string, Validate,
};
use serde::Serialize;

pub const REGION_ENV: &str = "CDK_DEFAULT_REGION";
pub const ACCOUNT_ENV: &str = "CDK_DEFAULT_ACCOUNT";
pub const TABLE_NAME_ENV: &str = "REDSHIFT_TABLE_NAME";
pub const PREDICTION_FUNCTION_ENV: &str = "PREDICTION_FUNCTION_NAME";
pub const FUNCTION_CODE_ENV: &str = "FUNCTION_CODE_PATH";
pub const DATASET_ENV: &str = "SYNTHETIC_DATASET_PATH";

pub const DEFAULT_REGION: &str = "eu-north-1";
pub const DEFAULT_PREDICTION_FUNCTION: &str = "public.ml_fn_prediction";
pub const DEFAULT_FUNCTION_CODE_PATH: &str = "lambda";
pub const DEFAULT_DATASET_PATH: &str = "synthetic-dataset";

/// Deployment-wide values that no unit produces. Resolved once before
/// assembly and only ever read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalConfig {
    region: String,
    account: Option<String>,
    table_name: Option<String>,
    prediction_function_name: String,
    function_code_path: String,
    dataset_path: String,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account: None,
            table_name: None,
            prediction_function_name: DEFAULT_PREDICTION_FUNCTION.to_string(),
            function_code_path: DEFAULT_FUNCTION_CODE_PATH.to_string(),
            dataset_path: DEFAULT_DATASET_PATH.to_string(),
        }
    }
}

impl ExternalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves every key through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let region = read(REGION_ENV).unwrap_or_else(|| {
            tracing::debug!("{} not set, falling back to {}", REGION_ENV, DEFAULT_REGION);
            DEFAULT_REGION.to_string()
        });
        let prediction_function_name =
            read(PREDICTION_FUNCTION_ENV).unwrap_or_else(|| DEFAULT_PREDICTION_FUNCTION.to_string());

        // 資產目錄相對於執行目錄
        let function_code_path =
            read(FUNCTION_CODE_ENV).unwrap_or_else(|| DEFAULT_FUNCTION_CODE_PATH.to_string());
        let dataset_path = read(DATASET_ENV).unwrap_or_else(|| DEFAULT_DATASET_PATH.to_string());

        let config = Self {
            region,
            account: read(ACCOUNT_ENV),
            table_name: read(TABLE_NAME_ENV),
            prediction_function_name,
            function_code_path,
            dataset_path,
        };

        tracing::info!("{}: {}", REGION_ENV, config.region);
        match &config.table_name {
            Some(table) => tracing::info!("Redshift table name: {}", table),
            None => tracing::warn!("{} is not set", TABLE_NAME_ENV),
        }
        tracing::info!(
            "Redshift ML prediction function name: {}",
            config.prediction_function_name
        );

        config
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn without_table_name(mut self) -> Self {
        self.table_name = None;
        self
    }

    pub fn with_prediction_function_name(mut self, name: impl Into<String>) -> Self {
        self.prediction_function_name = name.into();
        self
    }

    pub fn with_function_code_path(mut self, path: impl Into<String>) -> Self {
        self.function_code_path = path.into();
        self
    }

    pub fn with_dataset_path(mut self, path: impl Into<String>) -> Self {
        self.dataset_path = path.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Raw value; the unit that needs it decides whether absence is fatal.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn prediction_function_name(&self) -> &str {
        &self.prediction_function_name
    }

    /// 預測函式的程式碼目錄
    pub fn function_code_path(&self) -> &str {
        &self.function_code_path
    }

    /// 合成資料集目錄
    pub fn dataset_path(&self) -> &str {
        &self.dataset_path
    }
}

impl Validate for ExternalConfig {
    fn validate(&self) -> Result<()> {
        // 驗證區域
        validate_aws_region(REGION_ENV, &self.region)?;

        // 驗證帳號 (選填)
        if let Some(account) = &self.account {
            validate_account_id(ACCOUNT_ENV, account)?;
        }

        // 驗證預測函式名稱
        validate_non_empty_string(PREDICTION_FUNCTION_ENV, &self.prediction_function_name)?;

        // 驗證資產目錄
        validate_non_empty_string(FUNCTION_CODE_ENV, &self.function_code_path)?;
        validate_non_empty_string(DATASET_ENV, &self.dataset_path)?;
        Ok(())
    }
}
