use ecsroll_core::CONFIG_FILE;
use std::path::Path;

const TEMPLATE: &str = r#"[project]
name = "ecsroll-app"
region = "us-east-2"
# account = "123456789012"

[network]
mode = "create"
# cidr = "10.0.0.0/16"
# max_azs = 2
# nat_gateways = 1

# To reuse an existing VPC instead:
# mode = "import"
# vpc_id = "vpc-0123456789abcdef0"
# cidr = "10.0.0.0/16"
# availability_zones = ["us-east-2a", "us-east-2b"]
# public_subnet_ids = ["subnet-aaa", "subnet-bbb"]
# private_subnet_ids = ["subnet-ccc", "subnet-ddd"]

[load_balancer]
# listener_port = 80
# public = true
# health_check_path = "/"

[service]
# family = "ecsroll-app"
# container_name = "app"
# repository = "ecsroll-app"
# port = 3000
# cpu = 256
# memory = 512
# desired_count = 1

[trigger]
# enabled = true
# revision_length = 8
# on_default_tag = "skip"
# max_attempts = 3
# retry_backoff_ms = 500
"#;

/// Write a default `ecsroll.toml` into the current directory.
pub async fn init_project() -> anyhow::Result<()> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{CONFIG_FILE} already exists, refusing to overwrite");
    }

    std::fs::write(path, TEMPLATE)?;
    println!("Created {CONFIG_FILE}");

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Check your AWS setup:");
    println!("     ecsroll doctor");
    println!();
    println!("  2. Push an image to the repository, then deploy it:");
    println!("     ecsroll deploy --image-tag <tag>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecsroll_core::EcsrollConfig;

    #[test]
    fn template_is_a_valid_config() {
        let config: EcsrollConfig = toml::from_str(TEMPLATE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.project.name, "ecsroll-app");
    }
}
