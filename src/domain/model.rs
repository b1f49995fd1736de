use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// An identifying value that may only be known once the provisioning engine
/// has created the resource that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Token {
    Literal { value: String },
    Ref { stack: String, logical_id: String },
    Attr {
        stack: String,
        logical_id: String,
        attribute: String,
    },
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal {
            value: value.into(),
        }
    }

    pub fn reference(stack: &str, logical_id: &str) -> Self {
        Token::Ref {
            stack: stack.to_string(),
            logical_id: logical_id.to_string(),
        }
    }

    pub fn attr(stack: &str, logical_id: &str, attribute: &str) -> Self {
        Token::Attr {
            stack: stack.to_string(),
            logical_id: logical_id.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn owning_stack(&self) -> Option<&str> {
        match self {
            Token::Literal { .. } => None,
            Token::Ref { stack, .. } | Token::Attr { stack, .. } => Some(stack),
        }
    }

    /// Name under which the owning stack exports this value.
    pub fn export_name(&self) -> Option<String> {
        match self {
            Token::Literal { .. } => None,
            Token::Ref { stack, logical_id } => Some(format!("{}:ExportsOutputRef{}", stack, logical_id)),
            Token::Attr {
                stack,
                logical_id,
                attribute,
            } => Some(format!(
                "{}:ExportsOutputFnGetAtt{}{}",
                stack,
                logical_id,
                attribute.replace('.', "")
            )),
        }
    }

    /// Renders the token as seen from `current_stack`. Values owned by another
    /// stack are only reachable through that stack's exports.
    pub fn render(&self, current_stack: &str) -> Value {
        match self {
            Token::Literal { value } => Value::String(value.clone()),
            Token::Ref { stack, logical_id } if stack == current_stack => {
                json!({ "Ref": logical_id })
            }
            Token::Attr {
                stack,
                logical_id,
                attribute,
            } if stack == current_stack => json!({ "Fn::GetAtt": [logical_id, attribute] }),
            _ => json!({ "Fn::ImportValue": self.export_name() }),
        }
    }

    /// Renders the value owned by its stack, for use in that stack's outputs.
    pub fn render_local(&self) -> Value {
        match self.owning_stack() {
            Some(stack) => self.render(stack),
            None => self.render(""),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal { value } => write!(f, "{}", value),
            Token::Ref { stack, logical_id } => write!(f, "${{{}.{}}}", stack, logical_id),
            Token::Attr {
                stack,
                logical_id,
                attribute,
            } => write!(f, "${{{}.{}.{}}}", stack, logical_id, attribute),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandleKind {
    Network,
    SecurityGroup,
    WarehouseNamespace,
    WarehouseWorkgroup,
    DatabaseName,
    Function,
    RestApi,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Network => "network",
            HandleKind::SecurityGroup => "security-group",
            HandleKind::WarehouseNamespace => "warehouse-namespace",
            HandleKind::WarehouseWorkgroup => "warehouse-workgroup",
            HandleKind::DatabaseName => "database-name",
            HandleKind::Function => "function",
            HandleKind::RestApi => "rest-api",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHandle {
    pub vpc_id: Token,
    pub cidr: String,
    pub availability_zones: Vec<String>,
    pub public_subnet_ids: Vec<Token>,
    pub private_subnet_ids: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupHandle {
    pub name: String,
    pub group_id: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceHandle {
    pub name: String,
    pub arn: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkgroupHandle {
    pub name: String,
    pub namespace_name: String,
    pub arn: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHandle {
    pub name: Token,
    pub arn: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApiHandle {
    pub name: String,
    pub api_id: Token,
    pub stage_name: String,
}

/// Non-owning, read-only view of a resource published by a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Handle {
    Network(NetworkHandle),
    SecurityGroup(SecurityGroupHandle),
    WarehouseNamespace(NamespaceHandle),
    WarehouseWorkgroup(WorkgroupHandle),
    DatabaseName { name: String },
    Function(FunctionHandle),
    RestApi(RestApiHandle),
}

impl Handle {
    pub fn kind(&self) -> HandleKind {
        match self {
            Handle::Network(_) => HandleKind::Network,
            Handle::SecurityGroup(_) => HandleKind::SecurityGroup,
            Handle::WarehouseNamespace(_) => HandleKind::WarehouseNamespace,
            Handle::WarehouseWorkgroup(_) => HandleKind::WarehouseWorkgroup,
            Handle::DatabaseName { .. } => HandleKind::DatabaseName,
            Handle::Function(_) => HandleKind::Function,
            Handle::RestApi(_) => HandleKind::RestApi,
        }
    }

    /// Tokens that a consuming stack may need to import.
    pub fn tokens(&self) -> Vec<&Token> {
        match self {
            Handle::Network(h) => std::iter::once(&h.vpc_id)
                .chain(h.public_subnet_ids.iter())
                .chain(h.private_subnet_ids.iter())
                .collect(),
            Handle::SecurityGroup(h) => vec![&h.group_id],
            Handle::WarehouseNamespace(h) => vec![&h.arn],
            Handle::WarehouseWorkgroup(h) => vec![&h.arn],
            Handle::DatabaseName { .. } => Vec::new(),
            Handle::Function(h) => vec![&h.name, &h.arn],
            Handle::RestApi(h) => vec![&h.api_id],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(skip)]
    pub logical_id: String,
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty", default)]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none", default)]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none", default)]
    pub update_replace_policy: Option<String>,
}

impl Resource {
    pub fn new(logical_id: &str, resource_type: &str, properties: Value) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.push(logical_id.to_string());
        self
    }

    /// 刪除或替換堆疊時保留資源 (資料類資源使用)
    pub fn retain(mut self) -> Self {
        self.deletion_policy = Some("Retain".to_string());
        self.update_replace_policy = Some("Retain".to_string());
        self
    }
}

/// 部署引擎的 bootstrap 資產 bucket
pub const ASSET_BUCKET: &str = "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}";

pub fn asset_bucket() -> Value {
    json!({ "Fn::Sub": ASSET_BUCKET })
}

/// 本機目錄資產。合成時打包成 zip，以內容雜湊作為物件 key 上傳。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub id: String,
    pub path: String,
}

impl AssetSource {
    pub fn new(id: &str, path: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            path: path.into(),
        }
    }

    /// Stands in for the object key until the asset is packaged.
    pub fn key_placeholder(&self) -> String {
        format!("<asset:{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackOutput {
    pub value: Value,
    pub export_name: Option<String>,
}

/// Desired state declared by one unit. Resource order is declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StackTemplate {
    pub stack_name: String,
    pub description: Option<String>,
    resources: Vec<Resource>,
    outputs: BTreeMap<String, StackOutput>,
    assets: Vec<AssetSource>,
}

impl StackTemplate {
    pub fn new(stack_name: &str) -> Self {
        Self {
            stack_name: stack_name.to_string(),
            description: None,
            resources: Vec::new(),
            outputs: BTreeMap::new(),
            assets: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    pub fn position(&self, logical_id: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.logical_id == logical_id)
    }

    pub fn outputs(&self) -> &BTreeMap<String, StackOutput> {
        &self.outputs
    }

    /// Exports a locally owned token so other stacks can import it.
    pub fn export(&mut self, token: &Token) {
        let (Some(export_name), Some(owner)) = (token.export_name(), token.owning_stack()) else {
            return;
        };
        if owner != self.stack_name {
            return;
        }
        let output_key = export_name
            .rsplit(':')
            .next()
            .unwrap_or(&export_name)
            .to_string();
        self.outputs.entry(output_key).or_insert_with(|| StackOutput {
            value: token.render_local(),
            export_name: Some(export_name),
        });
    }

    /// 登記資產，回傳物件 key 的佔位值，合成時替換成實際 key
    pub fn add_asset(&mut self, asset: AssetSource) -> Value {
        let placeholder = Value::String(asset.key_placeholder());
        if !self.assets.iter().any(|a| a.id == asset.id) {
            self.assets.push(asset);
        }
        placeholder
    }

    pub fn assets(&self) -> &[AssetSource] {
        &self.assets
    }

    /// Template document with every asset placeholder replaced by its
    /// object key. Placeholders without a key are left as they are.
    pub fn to_json_with_assets(&self, object_keys: &BTreeMap<String, String>) -> Value {
        let replacements: Vec<(String, &String)> = self
            .assets
            .iter()
            .filter_map(|a| object_keys.get(&a.id).map(|key| (a.key_placeholder(), key)))
            .collect();

        let mut document = self.to_json();
        replace_strings(&mut document, &replacements);
        document
    }

    /// Informational output, not importable by other stacks.
    pub fn add_output(&mut self, key: &str, value: Value) {
        self.outputs.insert(
            key.to_string(),
            StackOutput {
                value,
                export_name: None,
            },
        );
    }

    pub fn to_json(&self) -> Value {
        let mut resources = Map::new();
        for resource in &self.resources {
            resources.insert(
                resource.logical_id.clone(),
                serde_json::to_value(resource).unwrap_or(Value::Null),
            );
        }

        let mut document = Map::new();
        if let Some(description) = &self.description {
            document.insert("Description".to_string(), Value::String(description.clone()));
        }
        document.insert("Resources".to_string(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|(key, output)| {
                    let rendered = match &output.export_name {
                        Some(name) => json!({ "Value": output.value, "Export": { "Name": name } }),
                        None => json!({ "Value": output.value }),
                    };
                    (key.clone(), rendered)
                })
                .collect();
            document.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Value::Object(document)
    }
}

fn replace_strings(value: &mut Value, replacements: &[(String, &String)]) {
    match value {
        Value::String(text) => {
            if let Some((_, key)) = replacements.iter().find(|(placeholder, _)| placeholder == text) {
                *text = (*key).clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| replace_strings(item, replacements)),
        Value::Object(map) => map.values_mut().for_each(|item| replace_strings(item, replacements)),
        _ => {}
    }
}
