use clap::Parser;
use loan_remediation_stack::utils::logger;
use loan_remediation_stack::RequestSchema;

#[derive(Parser)]
#[command(name = "validate-request")]
#[command(about = "Check a loan application body against the API request model")]
struct Args {
    /// JSON file holding one request body
    #[arg(required_unless_present = "print_schema")]
    body: Option<String>,

    /// Print the JSON schema attached to the API model and exit
    #[arg(long)]
    print_schema: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // 初始化日誌
    logger::init_logger(args.verbose, false);

    let schema = RequestSchema::default();

    if args.print_schema {
        println!("{}", serde_json::to_string_pretty(&schema.to_json_schema())?);
        return Ok(());
    }

    let Some(path) = args.body else {
        return Ok(());
    };

    tracing::info!("📁 Reading request body from: {}", path);
    let raw = match tokio::fs::read(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ Failed to read '{}': {}", path, e);
            std::process::exit(2);
        }
    };

    let body: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(body) => body,
        Err(e) => {
            eprintln!("❌ '{}' is not valid JSON: {}", path, e);
            std::process::exit(2);
        }
    };

    // 驗證請求內容
    let violations = schema.violations(&body);
    if violations.is_empty() {
        println!("✅ Request accepted");
        return Ok(());
    }

    eprintln!("❌ Request rejected with {} violation(s):", violations.len());
    for violation in &violations {
        eprintln!("   - {}", violation);
    }
    std::process::exit(1);
}
