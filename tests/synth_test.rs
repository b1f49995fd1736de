use loan_remediation_stack::config::toml_config::TomlConfig;
use loan_remediation_stack::core::synth::{BUNDLE_FILE, MANIFEST_FILE};
use loan_remediation_stack::{default_assembler, AssemblyWriter, ExternalConfig, LocalStorage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 在暫存目錄建立函式程式碼與合成資料集
fn write_asset_dirs(root: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let code = root.join("lambda");
    let dataset = root.join("synthetic-dataset");
    std::fs::create_dir_all(&code)?;
    std::fs::create_dir_all(dataset.join("2024"))?;
    std::fs::write(
        code.join("remedation_prediction.py"),
        "def lambda_handler(event, context):\n    return {'statusCode': 200}\n",
    )?;
    std::fs::write(dataset.join("2024").join("loans.csv"), "loan_id,age,income\n1,30,52000\n")?;
    Ok((code, dataset))
}

fn read_json(path: PathBuf) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

#[tokio::test]
async fn test_synthesize_assembly_to_disk() -> anyhow::Result<()> {
    let sources = TempDir::new()?;
    let (code, dataset) = write_asset_dirs(sources.path())?;
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let config = ExternalConfig::default()
        .with_table_name("loan_remediation")
        .with_account("123456789012")
        .with_function_code_path(code.to_str().unwrap())
        .with_dataset_path(dataset.to_str().unwrap());
    let topology = default_assembler().assemble(&config)?;

    let writer = AssemblyWriter::new(LocalStorage::new(output_path)).with_bundle(true);
    let report = writer.write(&topology, &config).await?;

    assert!(report.assembly_id.starts_with("asm_"));
    for stack in topology.build_order() {
        let template = read_json(temp_dir.path().join(format!("{}.template.json", stack)))?;
        assert!(template["Resources"].is_object());
    }

    let manifest = read_json(temp_dir.path().join(MANIFEST_FILE))?;
    assert_eq!(manifest["buildOrder"][4], "PerimeterFirewall");
    assert_eq!(
        manifest["artifacts"]["PerimeterFirewall"]["dependencies"],
        serde_json::json!(["ApiFront"])
    );

    // 6 份文件加上 2 個資產 zip
    let bundle = std::fs::File::open(temp_dir.path().join(BUNDLE_FILE))?;
    let archive = zip::ZipArchive::new(bundle)?;
    assert_eq!(archive.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_every_referenced_asset_key_is_written() -> anyhow::Result<()> {
    let sources = TempDir::new()?;
    let (code, dataset) = write_asset_dirs(sources.path())?;
    let temp_dir = TempDir::new()?;

    let config = ExternalConfig::default()
        .with_table_name("loan_remediation")
        .with_function_code_path(code.to_str().unwrap())
        .with_dataset_path(dataset.to_str().unwrap());
    let topology = default_assembler().assemble(&config)?;
    let writer = AssemblyWriter::new(LocalStorage::new(
        temp_dir.path().to_str().unwrap().to_string(),
    ));
    writer.write(&topology, &config).await?;

    let manifest = read_json(temp_dir.path().join(MANIFEST_FILE))?;
    let compute = read_json(temp_dir.path().join("ComputeFunction.template.json"))?;
    let network = read_json(temp_dir.path().join("NetworkFoundation.template.json"))?;

    let code_key = compute["Resources"]["RemedationPredictionLambda"]["Properties"]["Code"]["S3Key"]
        .as_str()
        .unwrap();
    let dataset_key = network["Resources"]["SyntheticDataDeployment"]["Properties"]["SourceObjectKeys"][0]
        .as_str()
        .unwrap();

    for key in [code_key, dataset_key] {
        assert!(!key.starts_with("<asset:"), "unresolved asset key {}", key);
        let entry = manifest["assets"]
            .as_object()
            .unwrap()
            .values()
            .find(|entry| entry["destination"]["objectKey"] == key)
            .unwrap_or_else(|| panic!("no manifest entry for {}", key));
        let file = temp_dir.path().join(entry["file"].as_str().unwrap());
        assert!(file.exists(), "{} missing", file.display());
    }

    let archive = zip::ZipArchive::new(std::fs::File::open(
        temp_dir.path().join(format!("asset.{}", dataset_key)),
    )?)?;
    assert_eq!(archive.file_names().collect::<Vec<_>>(), vec!["2024/loans.csv"]);
    Ok(())
}

#[tokio::test]
async fn test_deployment_file_drives_synthesis() -> anyhow::Result<()> {
    let sources = TempDir::new()?;
    let (code, dataset) = write_asset_dirs(sources.path())?;
    let temp_dir = TempDir::new()?;

    std::fs::write(
        sources.path().join("deploy.toml"),
        format!(
            r#"
[deployment]
name = "loan-remediation"

[environment]
region = "us-east-1"

[warehouse]
table_name = "loans_2026"

[assets]
function_code = "{}"
dataset = "{}"
"#,
            code.display(),
            dataset.display()
        ),
    )?;

    let deployment = TomlConfig::load(
        &LocalStorage::new(sources.path().to_str().unwrap().to_string()),
        "deploy.toml",
    )
    .await?;
    let config = deployment.apply_to(ExternalConfig::default());
    let topology = default_assembler().assemble(&config)?;

    let writer = AssemblyWriter::new(LocalStorage::new(
        temp_dir.path().to_str().unwrap().to_string(),
    ));
    let report = writer.write(&topology, &config).await?;
    assert!(report.bundle.is_none());

    let compute = read_json(temp_dir.path().join("ComputeFunction.template.json"))?;
    assert_eq!(
        compute["Resources"]["RemedationPredictionLambda"]["Properties"]["Environment"]["Variables"]
            ["REDSHIFT_TABLE_NAME"],
        "loans_2026"
    );

    let network = read_json(temp_dir.path().join("NetworkFoundation.template.json"))?;
    let subnet = &network["Resources"]["PrivateSubnet1"]["Properties"];
    assert_eq!(subnet["AvailabilityZone"], "us-east-1a");
    Ok(())
}
