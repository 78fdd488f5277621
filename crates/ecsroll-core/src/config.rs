use serde::{Deserialize, Serialize};

use crate::identity::RevisionLength;
use crate::spec::FixedConfig;
use crate::{Error, Result};

/// Name of the configuration file looked up in the project directory.
pub const CONFIG_FILE: &str = "ecsroll.toml";

/// CPU units accepted by Fargate task definitions.
const FARGATE_CPU_UNITS: [u32; 7] = [256, 512, 1024, 2048, 4096, 8192, 16384];

/// ecsroll.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcsrollConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Prefix of every stack name (`<name>-network`, `<name>-infra`, `<name>-service`)
    #[serde(default = "default_project_name")]
    pub name: String,
    /// AWS region (defaults to us-east-2)
    #[serde(default = "default_region")]
    pub region: String,
    /// Expected AWS account id, checked by `ecsroll doctor`
    pub account: Option<String>,
}

/// Where the VPC comes from. `mode` defaults to `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", try_from = "RawNetworkConfig")]
pub enum NetworkConfig {
    /// Provision a dedicated VPC in its own stack.
    Create {
        #[serde(default = "default_cidr")]
        cidr: String,
        #[serde(default = "default_max_azs")]
        max_azs: u8,
        #[serde(default = "default_nat_gateways")]
        nat_gateways: u8,
    },
    /// Reference an existing VPC; nothing is provisioned.
    Import {
        vpc_id: String,
        #[serde(default = "default_cidr")]
        cidr: String,
        availability_zones: Vec<String>,
        public_subnet_ids: Vec<String>,
        private_subnet_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NetworkMode {
    #[default]
    Create,
    Import,
}

/// `[network]` as written; the internally tagged form cannot default `mode`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetworkConfig {
    #[serde(default)]
    mode: NetworkMode,
    #[serde(default = "default_cidr")]
    cidr: String,
    #[serde(default = "default_max_azs")]
    max_azs: u8,
    #[serde(default = "default_nat_gateways")]
    nat_gateways: u8,
    vpc_id: Option<String>,
    availability_zones: Option<Vec<String>>,
    public_subnet_ids: Option<Vec<String>>,
    private_subnet_ids: Option<Vec<String>>,
}

impl TryFrom<RawNetworkConfig> for NetworkConfig {
    type Error = String;

    fn try_from(raw: RawNetworkConfig) -> std::result::Result<Self, Self::Error> {
        let missing = |field: &str| format!("network.{field} is required when mode = \"import\"");
        match raw.mode {
            NetworkMode::Create => Ok(Self::Create {
                cidr: raw.cidr,
                max_azs: raw.max_azs,
                nat_gateways: raw.nat_gateways,
            }),
            NetworkMode::Import => Ok(Self::Import {
                vpc_id: raw.vpc_id.ok_or_else(|| missing("vpc_id"))?,
                cidr: raw.cidr,
                availability_zones: raw
                    .availability_zones
                    .ok_or_else(|| missing("availability_zones"))?,
                public_subnet_ids: raw
                    .public_subnet_ids
                    .ok_or_else(|| missing("public_subnet_ids"))?,
                private_subnet_ids: raw
                    .private_subnet_ids
                    .ok_or_else(|| missing("private_subnet_ids"))?,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    /// Port the load balancer listens on
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
    /// Internet-facing when true, internal otherwise
    #[serde(default = "default_true")]
    pub public: bool,
    /// Target group health check path
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Task definition family
    #[serde(default = "default_project_name")]
    pub family: String,
    /// Container name inside the task definition
    #[serde(default = "default_container_name")]
    pub container_name: String,
    /// ECR repository name
    #[serde(default = "default_project_name")]
    pub repository: String,
    /// Port the container listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fargate CPU units
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    /// Fargate memory (MiB)
    #[serde(default = "default_memory")]
    pub memory: u32,
    /// Number of running tasks
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
    /// awslogs stream prefix
    #[serde(default = "default_project_name")]
    pub log_stream_prefix: String,
    #[serde(default = "default_true")]
    pub enable_execute_command: bool,
}

/// What to do when the operator omits the image tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDefaultTag {
    /// Register the deployment spec but do not force a redeploy.
    #[default]
    Skip,
    /// Force a redeploy keyed by `force-update-latest`.
    Invoke,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Tag-derived task definition naming and forced redeploys.
    /// `false` keeps a single stable task definition id and never forces.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub revision_length: RevisionLength,
    #[serde(default)]
    pub on_default_tag: OnDefaultTag,
    /// Attempts for a forced redeploy that fails transiently
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubled on every further attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            region: default_region(),
            account: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::Create {
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            nat_gateways: default_nat_gateways(),
        }
    }
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            listener_port: default_listener_port(),
            public: true,
            health_check_path: default_health_check_path(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            family: default_project_name(),
            container_name: default_container_name(),
            repository: default_project_name(),
            port: default_port(),
            cpu: default_cpu(),
            memory: default_memory(),
            desired_count: default_desired_count(),
            log_stream_prefix: default_project_name(),
            enable_execute_command: true,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            revision_length: RevisionLength::DEFAULT,
            on_default_tag: OnDefaultTag::Skip,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ServiceConfig {
    /// The tag-independent part of every [`crate::DeploymentSpec`].
    pub fn fixed(&self) -> FixedConfig {
        FixedConfig {
            family: self.family.clone(),
            container_name: self.container_name.clone(),
            repository: self.repository.clone(),
            port: self.port,
            cpu: self.cpu,
            memory: self.memory,
            log_stream_prefix: self.log_stream_prefix.clone(),
        }
    }
}

impl ProjectConfig {
    pub fn network_stack(&self) -> String {
        format!("{}-network", self.name)
    }

    pub fn infra_stack(&self) -> String {
        format!("{}-infra", self.name)
    }

    pub fn service_stack(&self) -> String {
        format!("{}-service", self.name)
    }
}

impl EcsrollConfig {
    /// Load from ecsroll.toml at the given path, or return defaults if not found.
    ///
    /// The loaded configuration is validated before it is returned.
    pub fn load(project_dir: &std::path::Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        let config: Self = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| Error::ConfigParse {
                path: config_path.clone(),
                source: e,
            })?
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the provisioning API would refuse later: names, ports,
    /// Fargate CPU/memory pairs and a VPC range too small for its subnets.
    pub fn validate(&self) -> Result<()> {
        validate_stack_prefix(&self.project.name)?;

        if self.project.region.trim().is_empty() {
            return Err(invalid("project.region", "must not be empty"));
        }

        match &self.network {
            NetworkConfig::Create {
                cidr,
                max_azs,
                nat_gateways,
            } => {
                if !(2..=6).contains(max_azs) {
                    return Err(invalid(
                        "network.max_azs",
                        format!("must be between 2 and 6, got {max_azs}"),
                    ));
                }
                if nat_gateways > max_azs {
                    return Err(invalid(
                        "network.nat_gateways",
                        format!("{nat_gateways} exceeds max_azs ({max_azs})"),
                    ));
                }
                validate_vpc_cidr(cidr, u32::from(*max_azs) * 2)?;
            }
            NetworkConfig::Import {
                vpc_id,
                public_subnet_ids,
                private_subnet_ids,
                ..
            } => {
                if vpc_id.trim().is_empty() {
                    return Err(invalid("network.vpc_id", "must not be empty"));
                }
                if public_subnet_ids.len() < 2 {
                    return Err(invalid(
                        "network.public_subnet_ids",
                        "a load balancer needs at least two public subnets",
                    ));
                }
                if private_subnet_ids.is_empty() {
                    return Err(invalid(
                        "network.private_subnet_ids",
                        "at least one private subnet is required",
                    ));
                }
            }
        }

        if self.service.port == 0 {
            return Err(invalid("service.port", "must not be 0"));
        }
        if self.load_balancer.listener_port == 0 {
            return Err(invalid("load_balancer.listener_port", "must not be 0"));
        }
        if !FARGATE_CPU_UNITS.contains(&self.service.cpu) {
            return Err(invalid(
                "service.cpu",
                format!("{} is not a Fargate CPU size", self.service.cpu),
            ));
        }
        if !fargate_memory_fits(self.service.cpu, self.service.memory) {
            return Err(invalid(
                "service.memory",
                format!(
                    "{} MiB is not a Fargate memory size for {} CPU units",
                    self.service.memory, self.service.cpu
                ),
            ));
        }
        for (field, value) in [
            ("service.family", &self.service.family),
            ("service.container_name", &self.service.container_name),
            ("service.repository", &self.service.repository),
            ("service.log_stream_prefix", &self.service.log_stream_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if self.trigger.max_attempts == 0 {
            return Err(invalid("trigger.max_attempts", "must be at least 1"));
        }

        Ok(())
    }
}

/// Stack names allow `[A-Za-z][A-Za-z0-9-]*` up to 128 characters; the
/// longest suffix appended is `-network`.
fn validate_stack_prefix(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_alpha || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            "project.name",
            format!("{name:?} must start with a letter and contain only letters, digits and '-'"),
        ));
    }
    if name.len() > 120 {
        return Err(invalid("project.name", "must be at most 120 characters"));
    }
    Ok(())
}

/// Memory sizes (MiB) Fargate pairs with each CPU size.
fn fargate_memory_fits(cpu: u32, memory: u32) -> bool {
    let (min, max, step) = match cpu {
        256 => return [512, 1024, 2048].contains(&memory),
        512 => (1024, 4096, 1024),
        1024 => (2048, 8192, 1024),
        2048 => (4096, 16384, 1024),
        4096 => (8192, 30720, 1024),
        8192 => (16384, 61440, 4096),
        16384 => (32768, 122880, 8192),
        _ => return false,
    };
    (min..=max).contains(&memory) && (memory - min) % step == 0
}

/// The VPC is split into `subnets` /24 blocks, so its prefix must leave
/// room for them. VPCs range from /16 to /28.
fn validate_vpc_cidr(cidr: &str, subnets: u32) -> Result<()> {
    let prefix = cidr
        .split_once('/')
        .filter(|(addr, _)| addr.parse::<std::net::Ipv4Addr>().is_ok())
        // arch-lint: allow(no-silent-result-drop) reason="an unparsable prefix length is reported by the ok_or_else below as an invalid network.cidr"
        .and_then(|(_, len)| len.parse::<u32>().ok())
        .filter(|len| (16..=28).contains(len))
        .ok_or_else(|| {
            invalid(
                "network.cidr",
                format!("{cidr:?} is not an IPv4 range between /16 and /28"),
            )
        })?;

    let available = 1u32 << (24u32.saturating_sub(prefix));
    if prefix > 24 || available < subnets {
        return Err(invalid(
            "network.cidr",
            format!("{cidr} cannot hold {subnets} /24 subnets"),
        ));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

fn default_project_name() -> String {
    "ecsroll-app".to_owned()
}

fn default_region() -> String {
    "us-east-2".to_owned()
}

fn default_cidr() -> String {
    "10.0.0.0/16".to_owned()
}

fn default_max_azs() -> u8 {
    2
}

fn default_nat_gateways() -> u8 {
    1
}

fn default_listener_port() -> u16 {
    80
}

fn default_health_check_path() -> String {
    "/".to_owned()
}

fn default_container_name() -> String {
    "app".to_owned()
}

fn default_port() -> u16 {
    3000
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

fn default_desired_count() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}
