use ecsroll_cloud::AwsClient;
use ecsroll_core::EcsrollConfig;
use ecsroll_stack::{DeployRequest, StackGraph, UpstreamMode};
use std::path::Path;

/// Provision the stack graph and roll the service onto `image_tag`.
pub async fn deploy(image_tag: Option<&str>, service_only: bool, json: bool) -> anyhow::Result<()> {
    let config = EcsrollConfig::load(Path::new("."))?;

    // Tag validation happens before any AWS call.
    let upstream = if service_only {
        UpstreamMode::Reference
    } else {
        UpstreamMode::Provision
    };
    let request = DeployRequest::new(image_tag, upstream)?;

    let client = AwsClient::new(&config.project.region);
    eprintln!(
        "Deploying {}:{} to {} ({})...",
        config.service.repository, request.tag.tag, config.project.name, config.project.region
    );

    let report = StackGraph::new(&config, &client, &client, &client)
        .compose(&request)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("Deployed {}", report.image);
    println!(
        "  Revision:       {}",
        report.revision.as_ref().map_or("(disabled)", |r| r.as_str())
    );
    println!("  Trigger:        {}", report.outcome);
    println!("  Cluster:        {}", report.cluster_name);
    println!("  Service:        {}", report.service_name);
    println!("  Service ARN:    {}", report.service_arn);
    println!("  Target group:   {}", report.target_group_arn);
    println!();
    println!("URL: http://{}", report.load_balancer_dns);

    Ok(())
}
