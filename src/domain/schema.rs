//! Request body contract for the loan submission endpoint.
//!
//! The same field table renders the JSON schema attached to the API model
//! and validates submissions offline, so the two cannot drift apart.

use crate::utils::error::{Result, StackError};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldConstraint {
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub constraint: FieldConstraint,
}

const fn integer(name: &'static str, min: i64, max: i64) -> FieldSpec {
    FieldSpec {
        name,
        constraint: FieldConstraint::Integer { min, max },
    }
}

const fn number(name: &'static str, min: f64, max: f64) -> FieldSpec {
    FieldSpec {
        name,
        constraint: FieldConstraint::Number { min, max },
    }
}

const fn one_of(name: &'static str, values: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        constraint: FieldConstraint::Enum(values),
    }
}

pub const LOAN_REQUEST_FIELDS: &[FieldSpec] = &[
    integer("age", 18, 65),
    one_of("gender", &["Male", "Female"]),
    integer("income", 20_000, 200_000),
    one_of("loan_type", &["Personal", "Auto", "Home", "Student", "Business"]),
    integer("loan_amount", 10_000, 500_000),
    number("interest_rate", 0.05, 0.2),
    integer("loan_term", 12, 60),
    number("loan_interest_rate", 5.0, 20.0),
    integer("credit_score", 300, 850),
    one_of("employment_status", &["Employed", "Self-employed", "Unemployed"]),
    one_of("marital_status", &["Married", "Single", "Divorced"]),
    one_of(
        "remediation_strategy",
        &[
            "Payment Reminder",
            "Loan Restructuring",
            "Debt Consolidation",
            "Forbearance",
            "Deferment",
            "Refinancing",
        ],
    ),
    integer("missed_payments", 0, 12),
    integer("missed_payments_duration", 0, 12),
];

pub const REQUEST_MODEL_NAME: &str = "RequestBodyModel";

#[derive(Debug, Clone)]
pub struct RequestSchema {
    title: &'static str,
    fields: &'static [FieldSpec],
}

impl Default for RequestSchema {
    fn default() -> Self {
        Self::loan_request()
    }
}

impl RequestSchema {
    pub fn loan_request() -> Self {
        Self {
            title: REQUEST_MODEL_NAME,
            fields: LOAN_REQUEST_FIELDS,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON schema (draft 4) as accepted by API Gateway models.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in self.fields {
            let property = match &field.constraint {
                FieldConstraint::Integer { min, max } => {
                    json!({ "type": "integer", "minimum": min, "maximum": max })
                }
                FieldConstraint::Number { min, max } => {
                    json!({ "type": "number", "minimum": min, "maximum": max })
                }
                FieldConstraint::Enum(values) => json!({ "type": "string", "enum": values }),
            };
            properties.insert(field.name.to_string(), property);
        }

        let required: Vec<&str> = self.fields.iter().map(|f| f.name).collect();

        json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "type": "object",
            "title": self.title,
            "required": required,
            "properties": properties,
        })
    }

    /// Every violation in `body`, in field declaration order.
    pub fn violations(&self, body: &Value) -> Vec<String> {
        let Some(object) = body.as_object() else {
            return vec!["body: expected a JSON object".to_string()];
        };

        self.fields
            .iter()
            .filter_map(|field| match object.get(field.name) {
                None | Some(Value::Null) => Some(format!("{}: required field is missing", field.name)),
                Some(value) => check_field(field, value)
                    .err()
                    .map(|reason| format!("{}: {}", field.name, reason)),
            })
            .collect()
    }

    /// 驗證請求內容，任何違規都回傳 `RequestRejected`
    pub fn validate(&self, body: &Value) -> Result<()> {
        let violations = self.violations(body);
        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!("Rejecting submission with {} violation(s)", violations.len());
            Err(StackError::RequestRejected { violations })
        }
    }
}

fn check_field(field: &FieldSpec, value: &Value) -> std::result::Result<(), String> {
    match &field.constraint {
        FieldConstraint::Integer { min, max } => {
            let n = as_integer(value).ok_or_else(|| format!("expected an integer, got {}", value))?;
            if n < *min || n > *max {
                return Err(format!("{} is outside [{}, {}]", n, min, max));
            }
            Ok(())
        }
        FieldConstraint::Number { min, max } => {
            let n = value
                .as_f64()
                .ok_or_else(|| format!("expected a number, got {}", value))?;
            if n < *min || n > *max {
                return Err(format!("{} is outside [{}, {}]", n, min, max));
            }
            Ok(())
        }
        FieldConstraint::Enum(values) => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("expected a string, got {}", value))?;
            if !values.contains(&s) {
                return Err(format!("'{}' is not one of: {}", s, values.join(", ")));
            }
            Ok(())
        }
    }
}

// 18.0 counts as an integer in JSON schema; 18.5 does not.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
