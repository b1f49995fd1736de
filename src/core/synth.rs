use crate::config::ExternalConfig;
use crate::core::assets::{package_directory, PackagedAsset};
use crate::core::topology::Topology;
use crate::domain::model::ASSET_BUCKET;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const BUNDLE_FILE: &str = "assembly.zip";

pub fn template_file_name(stack: &str) -> String {
    format!("{}.template.json", stack)
}

/// What was written for one synthesis run.
#[derive(Debug, Clone)]
pub struct SynthReport {
    pub assembly_id: String,
    pub files: Vec<String>,
    /// 資產 id 對應的物件 key
    pub assets: BTreeMap<String, String>,
    pub bundle: Option<String>,
}

/// Writes a topology as a cloud assembly: one template per unit, one zip
/// per declared asset, and a manifest describing build order, cross-stack
/// dependencies and where each asset must be uploaded.
pub struct AssemblyWriter<S: Storage> {
    storage: S,
    bundle: bool,
}

impl<S: Storage> AssemblyWriter<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            bundle: false,
        }
    }

    pub fn with_bundle(mut self, bundle: bool) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn manifest(
        topology: &Topology,
        config: &ExternalConfig,
        assets: &BTreeMap<String, PackagedAsset>,
        created_at: DateTime<Utc>,
    ) -> Value {
        let mut artifacts = Map::new();
        for unit in topology.units() {
            artifacts.insert(
                unit.name.clone(),
                json!({
                    "type": "aws:cloudformation:stack",
                    "environment": format!(
                        "aws://{}/{}",
                        config.account().unwrap_or("unknown-account"),
                        config.region()
                    ),
                    "properties": { "templateFile": template_file_name(&unit.name) },
                    "dependencies": unit.depends_on,
                    "publishes": unit.outputs.keys().collect::<Vec<_>>(),
                    "assets": unit.template.assets().iter().map(|a| &a.id).collect::<Vec<_>>()
                }),
            );
        }

        let mut asset_entries = Map::new();
        for (id, asset) in assets {
            asset_entries.insert(
                id.clone(),
                json!({
                    "source": { "path": asset.source, "packaging": "zip" },
                    "file": asset.file_name(),
                    "files": asset.file_count,
                    "destination": {
                        "bucketName": ASSET_BUCKET,
                        "objectKey": asset.object_key()
                    }
                }),
            );
        }

        json!({
            "version": "1.0",
            "assemblyId": format!("asm_{}", created_at.format("%Y%m%d_%H%M%S")),
            "createdAt": created_at.to_rfc3339(),
            "context": config,
            "buildOrder": topology.build_order(),
            "artifacts": artifacts,
            "assets": asset_entries,
            "edges": topology.edges(),
        })
    }

    /// 打包資產，再寫出模板與 manifest。任何資產失敗時不寫出模板。
    pub async fn write(&self, topology: &Topology, config: &ExternalConfig) -> Result<SynthReport> {
        // 打包所有資產 (同一 id 只打包一次)
        let mut packaged: BTreeMap<String, PackagedAsset> = BTreeMap::new();
        for unit in topology.units() {
            for asset in unit.template.assets() {
                if packaged.contains_key(&asset.id) {
                    continue;
                }
                let result = package_directory(asset).await?;
                tracing::info!(
                    "Packaged asset {} from {} ({} files)",
                    asset.id,
                    asset.path,
                    result.file_count
                );
                packaged.insert(asset.id.clone(), result);
            }
        }
        let object_keys: BTreeMap<String, String> = packaged
            .iter()
            .map(|(id, asset)| (id.clone(), asset.object_key()))
            .collect();

        let created_at = Utc::now();
        let manifest = Self::manifest(topology, config, &packaged, created_at);
        let assembly_id = manifest["assemblyId"].as_str().unwrap_or_default().to_string();

        let mut documents: Vec<(String, Vec<u8>)> = Vec::new();
        for unit in topology.units() {
            let template = unit.template.to_json_with_assets(&object_keys);
            documents.push((template_file_name(&unit.name), serde_json::to_vec_pretty(&template)?));
        }
        documents.push((MANIFEST_FILE.to_string(), serde_json::to_vec_pretty(&manifest)?));

        // 寫出資產
        for asset in packaged.values() {
            tracing::debug!("Writing {} ({} bytes)", asset.file_name(), asset.archive.len());
            self.storage.write_file(&asset.file_name(), &asset.archive).await?;
        }

        // 寫出模板與 manifest
        for (path, body) in &documents {
            tracing::debug!("Writing {} ({} bytes)", path, body.len());
            self.storage.write_file(path, body).await?;
        }

        let bundle = if self.bundle {
            let mut entries: Vec<(String, &[u8])> = documents
                .iter()
                .map(|(path, body)| (path.clone(), body.as_slice()))
                .collect();
            entries.extend(packaged.values().map(|a| (a.file_name(), a.archive.as_slice())));

            let zip_data = Self::pack(&entries)?;
            tracing::debug!("Writing {} ({} bytes)", BUNDLE_FILE, zip_data.len());
            self.storage.write_file(BUNDLE_FILE, &zip_data).await?;
            Some(BUNDLE_FILE.to_string())
        } else {
            None
        };

        tracing::info!(
            "Synthesized {} stacks and {} assets into assembly {}",
            topology.units().len(),
            packaged.len(),
            assembly_id
        );

        Ok(SynthReport {
            assembly_id,
            files: documents.into_iter().map(|(path, _)| path).collect(),
            assets: object_keys,
            bundle,
        })
    }

    fn pack(entries: &[(String, &[u8])]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (path, body) in entries {
            zip.start_file::<_, ()>(path.as_str(), FileOptions::default())?;
            zip.write_all(body)?;
        }
        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::StackError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryStorage {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStorage {
        fn get(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }

        fn names(&self) -> Vec<String> {
            self.files.lock().unwrap().keys().cloned().collect()
        }
    }

    impl Storage for &MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.get(path).ok_or_else(|| {
                StackError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.lock().unwrap().insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    /// 建立函式程式碼與資料集目錄
    fn asset_dirs() -> (TempDir, ExternalConfig) {
        let dir = TempDir::new().unwrap();
        let code = dir.path().join("lambda");
        let dataset = dir.path().join("synthetic-dataset");
        std::fs::create_dir(&code).unwrap();
        std::fs::create_dir(&dataset).unwrap();
        std::fs::write(code.join("remedation_prediction.py"), "def lambda_handler(e, c):\n    return {}\n").unwrap();
        std::fs::write(dataset.join("loans.csv"), "loan_id,age\n1,30\n").unwrap();

        let config = ExternalConfig::default()
            .with_table_name("loans")
            .with_function_code_path(code.to_str().unwrap())
            .with_dataset_path(dataset.to_str().unwrap());
        (dir, config)
    }

    fn topology(config: &ExternalConfig) -> Topology {
        crate::app::units::default_assembler().assemble(config).unwrap()
    }

    #[test]
    fn test_manifest_lists_order_and_dependencies() {
        let config = ExternalConfig::default()
            .with_table_name("loans")
            .with_account("123456789012");
        let created_at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        let manifest = AssemblyWriter::<&MemoryStorage>::manifest(
            &topology(&config),
            &config,
            &BTreeMap::new(),
            created_at,
        );

        assert_eq!(manifest["assemblyId"], "asm_20260102_030405");
        assert_eq!(
            manifest["buildOrder"],
            json!(["NetworkFoundation", "AnalyticsWarehouse", "ComputeFunction", "ApiFront", "PerimeterFirewall"])
        );
        let warehouse = &manifest["artifacts"]["AnalyticsWarehouse"];
        assert_eq!(warehouse["dependencies"], json!(["NetworkFoundation"]));
        assert_eq!(warehouse["environment"], "aws://123456789012/eu-north-1");
        assert_eq!(
            warehouse["properties"]["templateFile"],
            "AnalyticsWarehouse.template.json"
        );
        assert_eq!(
            manifest["artifacts"]["ComputeFunction"]["assets"],
            json!(["RemedationPredictionCode"])
        );
        assert_eq!(manifest["context"]["table_name"], "loans");
        assert_eq!(manifest["edges"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_function_code_key_exists_in_output() {
        let (_dir, config) = asset_dirs();
        let storage = MemoryStorage::default();
        let writer = AssemblyWriter::new(&storage);

        let report = tokio_test::block_on(writer.write(&topology(&config), &config)).unwrap();

        let template: Value =
            serde_json::from_slice(&storage.get("ComputeFunction.template.json").unwrap()).unwrap();
        let key = template["Resources"]["RemedationPredictionLambda"]["Properties"]["Code"]["S3Key"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(report.assets["RemedationPredictionCode"], key);

        let manifest: Value = serde_json::from_slice(&storage.get(MANIFEST_FILE).unwrap()).unwrap();
        let entry = &manifest["assets"]["RemedationPredictionCode"];
        assert_eq!(entry["destination"]["objectKey"], key.as_str());

        let file = entry["file"].as_str().unwrap();
        let archive_bytes = storage.get(file).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(archive_bytes)).unwrap();
        assert!(archive.by_name("remedation_prediction.py").is_ok());
    }

    #[test]
    fn test_write_with_bundle() {
        let (_dir, config) = asset_dirs();
        let storage = MemoryStorage::default();
        let writer = AssemblyWriter::new(&storage).with_bundle(true);

        let report = tokio_test::block_on(writer.write(&topology(&config), &config)).unwrap();

        assert_eq!(report.files.len(), 6);
        assert_eq!(report.assets.len(), 2);
        assert_eq!(report.bundle.as_deref(), Some(BUNDLE_FILE));

        let archive_bytes = storage.get(BUNDLE_FILE).unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(archive_bytes)).unwrap();
        assert_eq!(archive.len(), 8);

        let template: Value =
            serde_json::from_slice(&storage.get("NetworkFoundation.template.json").unwrap()).unwrap();
        assert!(template["Outputs"]["ExportsOutputRefPrivateSubnet1"].is_object());
        assert_eq!(
            template["Resources"]["SyntheticDataDeployment"]["Properties"]["SourceObjectKeys"][0],
            report.assets["SyntheticDataset"].as_str()
        );
    }

    #[test]
    fn test_missing_asset_writes_nothing() {
        let (dir, config) = asset_dirs();
        let config = config.with_function_code_path(dir.path().join("absent").to_str().unwrap());
        let storage = MemoryStorage::default();
        let writer = AssemblyWriter::new(&storage);

        let err = tokio_test::block_on(writer.write(&topology(&config), &config)).unwrap_err();
        assert!(matches!(err, StackError::AssetError { ref asset, .. } if asset == "RemedationPredictionCode"));
        assert!(storage.names().is_empty());
    }
}
