use crate::core::graph::Edge;
use crate::domain::model::{Handle, StackTemplate};
use std::collections::{BTreeMap, HashMap};

/// A unit after construction: its declared template and published handles.
#[derive(Debug, Clone)]
pub struct ConstructedUnit {
    pub name: String,
    pub template: StackTemplate,
    pub outputs: BTreeMap<String, Handle>,
    pub depends_on: Vec<String>,
}

/// Fully assembled deployment. Only ever built complete.
#[derive(Debug, Clone)]
pub struct Topology {
    units: Vec<ConstructedUnit>,
    edges: Vec<Edge>,
}

impl Topology {
    pub(crate) fn new(units: Vec<ConstructedUnit>, edges: Vec<Edge>) -> Self {
        Self { units, edges }
    }

    pub fn units(&self) -> &[ConstructedUnit] {
        &self.units
    }

    pub fn unit(&self, name: &str) -> Option<&ConstructedUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn build_order(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Handle published on `slot` by whichever unit produces it.
    pub fn handle(&self, slot: &str) -> Option<&Handle> {
        self.units.iter().find_map(|u| u.outputs.get(slot))
    }

    pub fn template(&self, unit: &str) -> Option<&StackTemplate> {
        self.unit(unit).map(|u| &u.template)
    }

    /// 執行摘要，供 CLI 輸出
    pub fn summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_resources: usize = self.units.iter().map(|u| u.template.resources().len()).sum();
        let total_handles: usize = self.units.iter().map(|u| u.outputs.len()).sum();

        summary.insert("total_units".to_string(), serde_json::Value::Number(self.units.len().into()));
        summary.insert("total_resources".to_string(), serde_json::Value::Number(total_resources.into()));
        summary.insert("total_handles".to_string(), serde_json::Value::Number(total_handles.into()));
        summary.insert("total_edges".to_string(), serde_json::Value::Number(self.edges.len().into()));

        let order: Vec<serde_json::Value> = self
            .units
            .iter()
            .map(|u| serde_json::Value::String(u.name.clone()))
            .collect();
        summary.insert("build_order".to_string(), serde_json::Value::Array(order));

        summary
    }
}
