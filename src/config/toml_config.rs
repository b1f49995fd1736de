use crate::config::ExternalConfig;
use crate::domain::ports::Storage;
use crate::utils::error::{Result, StackError};
use crate::utils::validation::{validate_non_empty_string, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Optional deployment file. Any value set here overrides the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub deployment: Option<DeploymentInfo>,
    pub environment: Option<EnvironmentConfig>,
    pub warehouse: Option<WarehouseConfig>,
    pub assets: Option<AssetsConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub region: Option<String>,
    pub account: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub table_name: Option<String>,
    pub prediction_function_name: Option<String>,
}

/// 資產目錄 (相對於執行目錄)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    pub function_code: Option<String>,
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
    pub bundle: Option<bool>,
}

impl TomlConfig {
    /// 透過 Storage 讀取 TOML 部署檔
    pub async fn load<S: Storage>(storage: &S, path: &str) -> Result<Self> {
        let raw = storage.read_file(path).await?;
        let content = String::from_utf8(raw).map_err(|e| StackError::ConfigValidationError {
            field: path.to_string(),
            message: format!("Deployment file is not valid UTF-8: {}", e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| StackError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TABLE_NAME})
    /// 未設定的變數替換成空字串，之後視為未設定
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| StackError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!("Environment variable {} referenced in config is not set", var_name);
                String::new()
            })
        });

        Ok(result.to_string())
    }

    /// Layers this file over `base`. Blank strings leave the base value alone.
    pub fn apply_to(&self, base: ExternalConfig) -> ExternalConfig {
        fn set(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.trim().is_empty())
        }

        let mut config = base;
        if let Some(env) = &self.environment {
            if let Some(region) = set(&env.region) {
                config = config.with_region(region);
            }
            if let Some(account) = set(&env.account) {
                config = config.with_account(account);
            }
        }
        if let Some(warehouse) = &self.warehouse {
            if let Some(table) = set(&warehouse.table_name) {
                config = config.with_table_name(table);
            }
            if let Some(function) = set(&warehouse.prediction_function_name) {
                config = config.with_prediction_function_name(function);
            }
        }
        if let Some(assets) = &self.assets {
            if let Some(code) = set(&assets.function_code) {
                config = config.with_function_code_path(code);
            }
            if let Some(dataset) = set(&assets.dataset) {
                config = config.with_dataset_path(dataset);
            }
        }
        config
    }

    pub fn deployment_name(&self) -> Option<&str> {
        self.deployment.as_ref().map(|d| d.name.as_str())
    }

    pub fn output_path(&self) -> Option<&str> {
        self.output.as_ref().and_then(|o| o.path.as_deref())
    }

    pub fn bundle(&self) -> bool {
        self.output.as_ref().and_then(|o| o.bundle).unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        // 驗證部署名稱
        if let Some(deployment) = &self.deployment {
            validate_non_empty_string("deployment.name", &deployment.name)?;
        }

        // 驗證輸出路徑
        if let Some(path) = self.output_path() {
            validate_non_empty_string("output.path", path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "cli")]
    use crate::config::LocalStorage;
    #[cfg(feature = "cli")]
    use std::io::Write;
    #[cfg(feature = "cli")]
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_deployment_file() {
        let toml_content = r#"
[deployment]
name = "loan-remediation"
description = "Prediction service"

[environment]
region = "us-west-2"
account = "123456789012"

[warehouse]
table_name = "loan_remediation"
prediction_function_name = "public.ml_fn_v2"

[output]
path = "./out"
bundle = true
"#;

        let file = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(file.deployment_name(), Some("loan-remediation"));
        assert_eq!(file.output_path(), Some("./out"));
        assert!(file.bundle());

        let config = file.apply_to(ExternalConfig::default());
        assert_eq!(config.region(), "us-west-2");
        assert_eq!(config.account(), Some("123456789012"));
        assert_eq!(config.table_name(), Some("loan_remediation"));
        assert_eq!(config.prediction_function_name(), "public.ml_fn_v2");
    }

    #[test]
    fn test_empty_file_keeps_base_config() {
        let file = TomlConfig::from_toml_str("").unwrap();
        let base = ExternalConfig::default().with_table_name("loans");
        assert_eq!(file.apply_to(base.clone()), base);
        assert!(!file.bundle());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("LRS_TEST_TABLE", "from_env_table");

        let toml_content = r#"
[warehouse]
table_name = "${LRS_TEST_TABLE}"
"#;

        let file = TomlConfig::from_toml_str(toml_content).unwrap();
        let config = file.apply_to(ExternalConfig::default());
        assert_eq!(config.table_name(), Some("from_env_table"));

        std::env::remove_var("LRS_TEST_TABLE");
    }

    #[test]
    fn test_unset_placeholder_leaves_value_missing() {
        let toml_content = r#"
[warehouse]
table_name = "${LRS_TEST_DEFINITELY_UNSET}"
"#;

        let file = TomlConfig::from_toml_str(toml_content).unwrap();
        let config = file.apply_to(ExternalConfig::default());
        assert!(config.table_name().is_none());
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = TomlConfig::from_toml_str("[warehouse\ntable_name = 1").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_config_loaded_through_storage() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut temp_file = NamedTempFile::new_in(temp_dir.path()).unwrap();
        temp_file
            .write_all(b"[deployment]\nname = \"file-test\"\n\n[assets]\nfunction_code = \"build/fn\"\n")
            .unwrap();
        let file_name = temp_file.path().file_name().unwrap().to_str().unwrap().to_string();

        let storage = LocalStorage::new(temp_dir.path().to_str().unwrap().to_string());
        let file = tokio_test::block_on(TomlConfig::load(&storage, &file_name)).unwrap();

        assert_eq!(file.deployment_name(), Some("file-test"));
        assert!(file.validate().is_ok());
        let config = file.apply_to(ExternalConfig::default());
        assert_eq!(config.function_code_path(), "build/fn");
        assert_eq!(config.dataset_path(), "synthetic-dataset");
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_missing_file_is_an_io_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_str().unwrap().to_string());
        let err = tokio_test::block_on(TomlConfig::load(&storage, "absent.toml")).unwrap_err();
        assert!(matches!(err, StackError::IoError(_)));
    }
}
