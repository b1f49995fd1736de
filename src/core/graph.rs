//! Build-order planning over declared slots.
//!
//! Edges are derived by matching input slot names to output slot names, so
//! adding a unit or rewiring one is a change to slot declarations only.

use crate::domain::model::HandleKind;
use crate::domain::ports::Unit;
use crate::utils::error::{Result, StackError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One output-slot to input-slot binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub producer: String,
    pub output: String,
    pub consumer: String,
    pub input: String,
    pub kind: HandleKind,
}

#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Registration indices in construction order.
    pub order: Vec<usize>,
    pub edges: Vec<Edge>,
    names: Vec<String>,
}

impl BuildPlan {
    pub fn unit_names(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Units that `unit` consumes handles from, without duplicates.
    pub fn dependencies_of(&self, unit: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| e.consumer == unit)
            .filter(|e| seen.insert(e.producer.as_str()))
            .map(|e| e.producer.as_str())
            .collect()
    }
}

/// 由槽位宣告推導邊並排序；圖有任何缺陷都在建構前回報
pub fn plan(units: &[Box<dyn Unit>]) -> Result<BuildPlan> {
    let names: Vec<String> = units.iter().map(|u| u.name().to_string()).collect();

    // 驗證單元名稱唯一
    let mut seen_names = HashSet::new();
    for name in &names {
        if !seen_names.insert(name.as_str()) {
            return Err(StackError::GraphError {
                message: format!("Unit '{}' is registered more than once", name),
            });
        }
    }

    // 每個輸出槽只能有一個生產者
    let mut producers: HashMap<String, (usize, HandleKind)> = HashMap::new();
    for (index, unit) in units.iter().enumerate() {
        for slot in unit.outputs() {
            if let Some((other, _)) = producers.get(&slot.name) {
                return Err(StackError::GraphError {
                    message: format!(
                        "Output slot '{}' is declared by both '{}' and '{}'",
                        slot.name, names[*other], names[index]
                    ),
                });
            }
            producers.insert(slot.name.clone(), (index, slot.kind));
        }
    }

    let mut edges = Vec::new();
    let mut in_degree = vec![0usize; units.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];

    for (index, unit) in units.iter().enumerate() {
        let mut upstream = BTreeSet::new();
        for slot in unit.inputs() {
            let Some(&(producer, kind)) = producers.get(&slot.name) else {
                if slot.required {
                    return Err(StackError::DependencyResolutionError {
                        unit: names[index].clone(),
                        slot: slot.name,
                    });
                }
                tracing::debug!(
                    "Optional input '{}' of '{}' has no producer, leaving it unbound",
                    slot.name,
                    names[index]
                );
                continue;
            };

            if kind != slot.kind {
                return Err(StackError::HandleTypeMismatch {
                    unit: names[index].clone(),
                    slot: slot.name,
                    expected: slot.kind.to_string(),
                    found: kind.to_string(),
                });
            }
            if producer == index {
                return Err(StackError::GraphError {
                    message: format!("Unit '{}' consumes its own output '{}'", names[index], slot.name),
                });
            }

            edges.push(Edge {
                producer: names[producer].clone(),
                output: slot.name.clone(),
                consumer: names[index].clone(),
                input: slot.name,
                kind,
            });
            upstream.insert(producer);
        }

        in_degree[index] = upstream.len();
        for producer in upstream {
            dependents[producer].push(index);
        }
    }

    // Kahn 演算法，同層時註冊順序較前者優先
    let mut ready: BTreeSet<usize> = (0..units.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(units.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != units.len() {
        let stuck: Vec<&str> = (0..units.len())
            .filter(|i| !order.contains(i))
            .map(|i| names[i].as_str())
            .collect();
        return Err(StackError::GraphError {
            message: format!("Dependency cycle between units: {}", stuck.join(", ")),
        });
    }

    Ok(BuildPlan {
        order,
        edges,
        names,
    })
}
