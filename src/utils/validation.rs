use crate::utils::error::{Result, StackError};
use regex::Regex;
use std::sync::OnceLock;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 區域格式：國家代碼、一或多個名稱段、編號 (例如 us-gov-west-1、us-isob-east-1)
fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("region pattern is a valid regex")
    })
}

/// 必填字串：空白視為未設定，而非格式錯誤
pub fn validate_required_string<'a>(field_name: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(StackError::MissingConfigError {
            field: field_name.to_string(),
        }),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StackError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// 驗證 AWS 區域格式
pub fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    if !region_pattern().is_match(region) {
        return Err(StackError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "Expected a region identifier such as 'eu-north-1'".to_string(),
        });
    }
    Ok(())
}

pub fn validate_account_id(field_name: &str, account: &str) -> Result<()> {
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(StackError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: account.to_string(),
            reason: "Account id must be exactly 12 digits".to_string(),
        });
    }
    Ok(())
}
