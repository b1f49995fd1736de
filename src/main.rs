use clap::Parser;
use loan_remediation_stack::utils::error::{ErrorCategory, StackError};
use loan_remediation_stack::utils::{logger, validation::Validate};
use loan_remediation_stack::{
    default_assembler, AssemblyWriter, CliConfig, ExternalConfig, LocalStorage, TomlConfig,
};

fn exit_code(error: &StackError) -> i32 {
    match error.category() {
        ErrorCategory::System => 1,
        ErrorCategory::Configuration => 2,
        ErrorCategory::Dependency => 3,
        ErrorCategory::Validation => 4,
    }
}

fn fail(context: &str, error: StackError) -> ! {
    tracing::error!("❌ {}: {} (Category: {:?})", context, error, error.category());
    tracing::error!("💡 Recovery suggestion: {}", error.recovery_suggestion());
    eprintln!("❌ {}: {}", context, error);
    eprintln!("💡 {}", error.recovery_suggestion());
    std::process::exit(exit_code(&error));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = CliConfig::parse();

    // 初始化日誌
    logger::init_from_cli(&cli);

    tracing::info!("Starting loan-remediation-stack");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = cli.validate() {
        fail("Invalid command line", e);
    }

    let mut config = ExternalConfig::from_env();
    if let Some(path) = cli.config.clone() {
        // 部署檔經由 Storage 讀取，相對路徑以目前目錄為準
        let file = match TomlConfig::load(&LocalStorage::new(".".to_string()), &path).await {
            Ok(file) => file,
            Err(e) => fail("Could not load deployment file", e),
        };
        if let Err(e) = file.validate() {
            fail("Invalid deployment file", e);
        }
        if let Some(name) = file.deployment_name() {
            tracing::info!("Deployment: {}", name);
        }
        if let Some(output_path) = file.output_path() {
            cli.output_path = output_path.to_string();
        }
        cli.bundle |= file.bundle();
        config = file.apply_to(config);
    }

    if let Err(e) = config.validate() {
        fail("Invalid environment", e);
    }

    // 建立組裝器
    let assembler = default_assembler();

    if cli.dry_run {
        let plan = match assembler.plan() {
            Ok(plan) => plan,
            Err(e) => fail("Build plan rejected", e),
        };
        println!("Build order:");
        for (step, name) in plan.unit_names().into_iter().enumerate() {
            let deps = plan.dependencies_of(name);
            if deps.is_empty() {
                println!("  {}. {}", step + 1, name);
            } else {
                println!("  {}. {} (after {})", step + 1, name, deps.join(", "));
            }
        }
        return Ok(());
    }

    let topology = match assembler.assemble(&config) {
        Ok(topology) => topology,
        Err(e) => fail("Assembly failed", e),
    };

    let writer = AssemblyWriter::new(LocalStorage::new(cli.output_path.clone())).with_bundle(cli.bundle);
    match writer.write(&topology, &config).await {
        Ok(report) => {
            let summary = topology.summary();
            tracing::info!("✅ Assembly {} written", report.assembly_id);
            println!("✅ Synthesized {} stacks into {}", report.files.len() - 1, cli.output_path);
            for file in &report.files {
                println!("   {}", file);
            }
            for (id, key) in &report.assets {
                println!("   asset {} -> {}", id, key);
            }
            if let Some(bundle) = &report.bundle {
                println!("📦 Bundle: {}", bundle);
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Err(e) => fail("Writing assembly failed", e),
    }

    Ok(())
}
