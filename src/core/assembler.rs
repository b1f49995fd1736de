use crate::config::ExternalConfig;
use crate::core::graph::{self, BuildPlan};
use crate::core::topology::{ConstructedUnit, Topology};
use crate::domain::model::Handle;
use crate::domain::ports::{BoundInputs, Unit, UnitContext};
use crate::utils::error::{Result, StackError};
use std::collections::HashMap;

/// Builds the unit graph in dependency order and threads published
/// handles into later units' input slots.
#[derive(Default)]
pub struct Assembler {
    units: Vec<Box<dyn Unit>>,
}

impl Assembler {
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Registration order only breaks ties; slots decide the build order.
    pub fn register(&mut self, unit: Box<dyn Unit>) -> &mut Self {
        self.units.push(unit);
        self
    }

    pub fn with_unit(mut self, unit: Box<dyn Unit>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// 只計算建置順序，不建構任何單元
    pub fn plan(&self) -> Result<BuildPlan> {
        graph::plan(&self.units)
    }

    /// Constructs every unit exactly once. Either the whole topology is
    /// returned or nothing is: on failure the error names the unit and the
    /// units that had already completed.
    pub fn assemble(&self, config: &ExternalConfig) -> Result<Topology> {
        let plan = self.plan()?;
        tracing::info!("Assembly plan: {}", plan.unit_names().join(" -> "));

        let mut published: HashMap<String, Handle> = HashMap::new();
        let mut constructed: Vec<ConstructedUnit> = Vec::with_capacity(plan.order.len());

        for &index in &plan.order {
            let unit = self.units[index].as_ref();
            let completed = || constructed.iter().map(|u| u.name.clone()).collect::<Vec<_>>();

            let result = self.construct_unit(unit, &plan, &published, config);
            let built = match result {
                Ok(built) => built,
                Err(e) => {
                    tracing::error!("Unit {} failed: {}", unit.name(), e);
                    return Err(StackError::UnitConstructionError {
                        unit: unit.name().to_string(),
                        completed: completed(),
                        source: Box::new(e),
                    });
                }
            };

            tracing::info!(
                "Constructed unit: {} (resources: {}, outputs: {})",
                built.name,
                built.template.resources().len(),
                built.outputs.len()
            );

            for (slot, handle) in &built.outputs {
                published.insert(slot.clone(), handle.clone());
            }
            constructed.push(built);
        }

        Ok(Topology::new(constructed, plan.edges))
    }

    fn construct_unit(
        &self,
        unit: &dyn Unit,
        plan: &BuildPlan,
        published: &HashMap<String, Handle>,
        config: &ExternalConfig,
    ) -> Result<ConstructedUnit> {
        let name = unit.name();

        // 綁定輸入槽
        let mut inputs = BoundInputs::new(name);
        for slot in unit.inputs() {
            match published.get(&slot.name) {
                Some(handle) if handle.kind() != slot.kind => {
                    return Err(StackError::HandleTypeMismatch {
                        unit: name.to_string(),
                        slot: slot.name,
                        expected: slot.kind.to_string(),
                        found: handle.kind().to_string(),
                    });
                }
                Some(handle) => {
                    tracing::debug!("Binding {}.{} <- {:?}", name, slot.name, handle.kind());
                    inputs.bind(&slot.name, handle.clone());
                }
                None if slot.required => {
                    return Err(StackError::DependencyResolutionError {
                        unit: name.to_string(),
                        slot: slot.name,
                    });
                }
                None => {}
            }
        }

        let ctx = UnitContext {
            config,
            inputs: &inputs,
        };
        let mut output = unit.construct(&ctx)?;

        // 驗證輸出契約
        let declared = unit.outputs();
        for slot in &declared {
            match output.handles.get(&slot.name) {
                Some(handle) if handle.kind() == slot.kind => {}
                Some(handle) => {
                    return Err(StackError::HandleTypeMismatch {
                        unit: name.to_string(),
                        slot: slot.name.clone(),
                        expected: slot.kind.to_string(),
                        found: handle.kind().to_string(),
                    });
                }
                None => {
                    return Err(StackError::GraphError {
                        message: format!("Unit '{}' did not publish output slot '{}'", name, slot.name),
                    });
                }
            }
        }
        if let Some(extra) = output
            .handles
            .keys()
            .find(|slot| !declared.iter().any(|d| &d.name == *slot))
        {
            return Err(StackError::GraphError {
                message: format!("Unit '{}' published undeclared output slot '{}'", name, extra),
            });
        }

        // 只匯出後續單元實際使用的 token
        for (slot, handle) in &output.handles {
            if plan.edges.iter().any(|e| e.producer == name && &e.output == slot) {
                for token in handle.tokens() {
                    output.template.export(token);
                }
            }
        }

        Ok(ConstructedUnit {
            name: name.to_string(),
            template: output.template,
            outputs: output.handles,
            depends_on: plan.dependencies_of(name).into_iter().map(String::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{HandleKind, StackTemplate};
    use crate::domain::ports::{InputSlot, OutputSlot, UnitOutput};
    use std::sync::{Arc, Mutex};

    /// Records construction order and what it saw bound.
    struct RecordingUnit {
        name: &'static str,
        needs: Option<&'static str>,
        gives: Option<&'static str>,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Unit for RecordingUnit {
        fn name(&self) -> &str {
            self.name
        }

        fn inputs(&self) -> Vec<InputSlot> {
            self.needs
                .map(|s| vec![InputSlot::required(s, HandleKind::DatabaseName)])
                .unwrap_or_default()
        }

        fn outputs(&self) -> Vec<OutputSlot> {
            self.gives
                .map(|s| vec![OutputSlot::new(s, HandleKind::DatabaseName)])
                .unwrap_or_default()
        }

        fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput> {
            if let Some(slot) = self.needs {
                let upstream = ctx.inputs.database_name(slot)?;
                self.log.lock().unwrap().push(format!("{} saw {}", self.name, upstream));
            } else {
                self.log.lock().unwrap().push(format!("{} built", self.name));
            }
            if self.fail {
                return Err(StackError::MissingConfigError {
                    field: "SOMETHING".to_string(),
                });
            }
            let mut output = UnitOutput::new(StackTemplate::new(self.name));
            if let Some(slot) = self.gives {
                output = output.publish(
                    slot,
                    Handle::DatabaseName {
                        name: format!("{}-value", self.name),
                    },
                );
            }
            Ok(output)
        }
    }

    fn recording(
        name: &'static str,
        needs: Option<&'static str>,
        gives: Option<&'static str>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn Unit> {
        Box::new(RecordingUnit {
            name,
            needs,
            gives,
            fail: false,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_handles_flow_to_consumers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let assembler = Assembler::new()
            .with_unit(recording("second", Some("one"), Some("two"), &log))
            .with_unit(recording("first", None, Some("one"), &log));

        let topology = assembler.assemble(&ExternalConfig::default()).unwrap();

        assert_eq!(topology.build_order(), vec!["first", "second"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first built".to_string(), "second saw first-value".to_string()]
        );
        assert_eq!(topology.unit("second").unwrap().depends_on, vec!["first".to_string()]);
    }

    #[test]
    fn test_failure_reports_completed_units_and_stops() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut assembler = Assembler::new();
        assembler.register(recording("first", None, Some("one"), &log));
        assembler.register(Box::new(RecordingUnit {
            name: "broken",
            needs: Some("one"),
            gives: Some("two"),
            fail: true,
            log: Arc::clone(&log),
        }));
        assembler.register(recording("last", Some("two"), None, &log));

        let err = assembler.assemble(&ExternalConfig::default()).unwrap_err();
        match err {
            StackError::UnitConstructionError { unit, completed, .. } => {
                assert_eq!(unit, "broken");
                assert_eq!(completed, vec!["first".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!log.lock().unwrap().iter().any(|l| l.starts_with("last")));
    }

    struct SilentUnit;

    impl Unit for SilentUnit {
        fn name(&self) -> &str {
            "silent"
        }

        fn outputs(&self) -> Vec<OutputSlot> {
            vec![OutputSlot::new("promised", HandleKind::Function)]
        }

        fn construct(&self, _ctx: &UnitContext<'_>) -> Result<UnitOutput> {
            Ok(UnitOutput::new(StackTemplate::new("silent")))
        }
    }

    #[test]
    fn test_unpublished_output_fails_assembly() {
        let assembler = Assembler::new().with_unit(Box::new(SilentUnit));
        let err = assembler.assemble(&ExternalConfig::default()).unwrap_err();
        assert!(matches!(err.root_cause(), StackError::GraphError { .. }));
    }

    #[test]
    fn test_empty_assembler_builds_empty_topology() {
        let assembler = Assembler::new();
        assert!(assembler.is_empty());
        let topology = assembler.assemble(&ExternalConfig::default()).unwrap();
        assert!(topology.units().is_empty());
    }
}
