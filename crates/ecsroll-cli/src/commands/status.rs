use ecsroll_cloud::AwsClient;
use ecsroll_core::EcsrollConfig;
use ecsroll_stack::{infra, service};
use std::path::Path;

pub async fn status() -> anyhow::Result<()> {
    let config = EcsrollConfig::load(Path::new("."))?;
    let client = AwsClient::new(&config.project.region);

    let infra = infra::resolve(&client, &config.project.infra_stack()).await?;
    let handle = service::resolve(
        &client,
        &config.project.service_stack(),
        &infra.cluster_name,
    )
    .await?;

    let status = client
        .describe_service(&handle.cluster_name, &handle.service_name)
        .await?;
    let last_key = client.last_trigger_key(&handle.service_arn).await?;

    println!("Service {} ({})", handle.service_name, handle.cluster_name);
    print!("{status}");
    println!(
        "  Last trigger:    {}",
        last_key.as_deref().unwrap_or("(none)")
    );
    println!("  URL:             http://{}", infra.load_balancer_dns);

    Ok(())
}
