use crate::config::ExternalConfig;
use crate::domain::model::{
    FunctionHandle, Handle, HandleKind, NamespaceHandle, NetworkHandle, RestApiHandle,
    SecurityGroupHandle, StackTemplate, WorkgroupHandle,
};
use crate::utils::error::{Result, StackError};
use std::collections::BTreeMap;

/// 讀寫合成產物的儲存介面
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSlot {
    pub name: String,
    pub kind: HandleKind,
    pub required: bool,
}

impl InputSlot {
    pub fn required(name: &str, kind: HandleKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, kind: HandleKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSlot {
    pub name: String,
    pub kind: HandleKind,
}

impl OutputSlot {
    pub fn new(name: &str, kind: HandleKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Handles bound to a unit's input slots, keyed by slot name.
#[derive(Debug, Clone, Default)]
pub struct BoundInputs {
    unit: String,
    handles: BTreeMap<String, Handle>,
}

macro_rules! typed_getter {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self, slot: &str) -> Result<&$ty> {
            match self.get(slot)? {
                Handle::$variant(inner) => Ok(inner),
                other => Err(self.mismatch(slot, HandleKind::$variant, other.kind())),
            }
        }
    };
}

impl BoundInputs {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            handles: BTreeMap::new(),
        }
    }

    pub fn bind(&mut self, slot: &str, handle: Handle) {
        self.handles.insert(slot.to_string(), handle);
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.handles.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, slot: &str) -> Result<&Handle> {
        self.handles
            .get(slot)
            .ok_or_else(|| StackError::DependencyResolutionError {
                unit: self.unit.clone(),
                slot: slot.to_string(),
            })
    }

    fn mismatch(&self, slot: &str, expected: HandleKind, found: HandleKind) -> StackError {
        StackError::HandleTypeMismatch {
            unit: self.unit.clone(),
            slot: slot.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    typed_getter!(network, Network, NetworkHandle);
    typed_getter!(security_group, SecurityGroup, SecurityGroupHandle);
    typed_getter!(namespace, WarehouseNamespace, NamespaceHandle);
    typed_getter!(workgroup, WarehouseWorkgroup, WorkgroupHandle);
    typed_getter!(function, Function, FunctionHandle);
    typed_getter!(rest_api, RestApi, RestApiHandle);

    pub fn database_name(&self, slot: &str) -> Result<&str> {
        match self.get(slot)? {
            Handle::DatabaseName { name } => Ok(name),
            other => Err(self.mismatch(slot, HandleKind::DatabaseName, other.kind())),
        }
    }
}

/// Everything a unit may read while declaring its resources.
pub struct UnitContext<'a> {
    pub config: &'a ExternalConfig,
    pub inputs: &'a BoundInputs,
}

/// Declared resources plus the handles published on each output slot.
#[derive(Debug, Clone)]
pub struct UnitOutput {
    pub template: StackTemplate,
    pub handles: BTreeMap<String, Handle>,
}

impl UnitOutput {
    pub fn new(template: StackTemplate) -> Self {
        Self {
            template,
            handles: BTreeMap::new(),
        }
    }

    pub fn publish(mut self, slot: &str, handle: Handle) -> Self {
        self.handles.insert(slot.to_string(), handle);
        self
    }
}

/// An independently deployable unit of the topology.
pub trait Unit: Send + Sync {
    fn name(&self) -> &str;

    fn inputs(&self) -> Vec<InputSlot> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<OutputSlot> {
        Vec::new()
    }

    /// Declares this unit's resources. Must not be called before every
    /// required input is bound in `ctx.inputs`.
    fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Token;

    #[test]
    fn test_missing_slot_is_a_dependency_error() {
        let inputs = BoundInputs::new("AnalyticsWarehouse");
        let err = inputs.network("network").unwrap_err();
        assert!(matches!(
            err,
            StackError::DependencyResolutionError { ref unit, ref slot }
                if unit == "AnalyticsWarehouse" && slot == "network"
        ));
    }

    #[test]
    fn test_wrong_handle_kind_is_a_mismatch() {
        let mut inputs = BoundInputs::new("ComputeFunction");
        inputs.bind("workgroup", Handle::DatabaseName { name: "dev".to_string() });

        let err = inputs.workgroup("workgroup").unwrap_err();
        match err {
            StackError::HandleTypeMismatch { expected, found, .. } => {
                assert_eq!(expected, "warehouse-workgroup");
                assert_eq!(found, "database-name");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(inputs.database_name("workgroup").unwrap(), "dev");
    }

    #[test]
    fn test_typed_getter_returns_bound_handle() {
        let mut inputs = BoundInputs::new("PerimeterFirewall");
        inputs.bind(
            "rest_api",
            Handle::RestApi(RestApiHandle {
                name: "Api".to_string(),
                api_id: Token::reference("ApiFront", "Api"),
                stage_name: "prod".to_string(),
            }),
        );
        assert_eq!(inputs.rest_api("rest_api").unwrap().stage_name, "prod");
        assert_eq!(inputs.len(), 1);
    }
}
