use ecsroll_cloud::{AwsClient, CheckResult};
use ecsroll_core::{CONFIG_FILE, EcsrollConfig};
use std::path::Path;

pub async fn doctor() -> anyhow::Result<()> {
    let loaded = EcsrollConfig::load(Path::new("."));
    let (config, config_check) = match loaded {
        Ok(config) if Path::new(CONFIG_FILE).exists() => (config, CheckResult::ok("Found")),
        Ok(config) => (config, CheckResult::fail("Not found (using defaults)")),
        // Keep diagnosing with defaults so the remaining checks still run.
        Err(e) => (EcsrollConfig::default(), CheckResult::fail(&e.to_string())),
    };

    let client = AwsClient::new(&config.project.region);
    let mut report = client.doctor(Some(&config)).await;
    report.config_file = config_check;

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed, see above for details");
    }

    Ok(())
}
