//! Network layer: the VPC every other layer is placed in.

use ecsroll_core::NetworkConfig;
use serde::Serialize;
use serde_json::{Value, json};

use crate::collaborator::{Provisioner, StackHandle};
use crate::descriptor::{ResourceKind, StackDescriptor, get_att, join, reference};
use crate::error::{DeployError, Layer};
use crate::outputs;

/// Host bits per subnet handed to `Fn::Cidr` (a /24 inside a /16).
const SUBNET_BITS: u32 = 8;

/// Read-only view of the network consumed by downstream layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkHandle {
    pub vpc_id: String,
    pub cidr: String,
    pub availability_zones: Vec<String>,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
}

impl NetworkHandle {
    /// Handle of an existing VPC as described in configuration. Empty for
    /// create mode, whose handle comes from stack outputs.
    fn imported(config: &NetworkConfig) -> Self {
        let NetworkConfig::Import {
            vpc_id,
            cidr,
            availability_zones,
            public_subnet_ids,
            private_subnet_ids,
        } = config
        else {
            return Self::default();
        };

        tracing::info!(vpc_id = %vpc_id, "using existing VPC");
        Self {
            vpc_id: vpc_id.clone(),
            cidr: cidr.clone(),
            availability_zones: availability_zones.clone(),
            public_subnet_ids: public_subnet_ids.clone(),
            private_subnet_ids: private_subnet_ids.clone(),
        }
    }
}

/// Template of a dedicated VPC with public and private subnets per AZ.
pub fn descriptor(stack_name: &str, cidr: &str, max_azs: u8, nat_gateways: u8) -> StackDescriptor {
    use ResourceKind::*;

    let mut stack = StackDescriptor::new(stack_name, "ecsroll network layer");

    stack.resource(
        "Vpc",
        Vpc,
        json!({
            "CidrBlock": cidr,
            "EnableDnsHostnames": true,
            "EnableDnsSupport": true,
            "Tags": [{ "Key": "Name", "Value": stack_name }],
        }),
    );
    stack.resource("InternetGateway", InternetGateway, json!({}));
    stack.resource(
        "GatewayAttachment",
        GatewayAttachment,
        json!({
            "VpcId": reference("Vpc"),
            "InternetGatewayId": reference("InternetGateway"),
        }),
    );
    stack.resource(
        "PublicRouteTable",
        RouteTable,
        json!({ "VpcId": reference("Vpc") }),
    );
    stack.resource_after(
        "PublicDefaultRoute",
        Route,
        json!({
            "RouteTableId": reference("PublicRouteTable"),
            "DestinationCidrBlock": "0.0.0.0/0",
            "GatewayId": reference("InternetGateway"),
        }),
        &["GatewayAttachment"],
    );

    let subnet_cidrs = json!({
        "Fn::Cidr": [get_att("Vpc", "CidrBlock"), u32::from(max_azs) * 2, SUBNET_BITS]
    });
    let select = |index: u32, from: &Value| json!({ "Fn::Select": [index, from] });
    let azs = json!({ "Fn::GetAZs": "" });

    for az in 0..u32::from(max_azs) {
        stack.resource(
            format!("PublicSubnet{az}"),
            Subnet,
            json!({
                "VpcId": reference("Vpc"),
                "AvailabilityZone": select(az, &azs),
                "CidrBlock": select(az, &subnet_cidrs),
                "MapPublicIpOnLaunch": true,
            }),
        );
        stack.resource(
            format!("PublicSubnet{az}RouteTableAssociation"),
            SubnetRouteTableAssociation,
            json!({
                "SubnetId": reference(&format!("PublicSubnet{az}")),
                "RouteTableId": reference("PublicRouteTable"),
            }),
        );
        stack.resource(
            format!("PrivateSubnet{az}"),
            Subnet,
            json!({
                "VpcId": reference("Vpc"),
                "AvailabilityZone": select(az, &azs),
                "CidrBlock": select(az + u32::from(max_azs), &subnet_cidrs),
                "MapPublicIpOnLaunch": false,
            }),
        );
    }

    for nat in 0..nat_gateways {
        stack.resource_after(
            format!("NatEip{nat}"),
            Eip,
            json!({ "Domain": "vpc" }),
            &["GatewayAttachment"],
        );
        stack.resource(
            format!("NatGateway{nat}"),
            NatGateway,
            json!({
                "AllocationId": get_att(&format!("NatEip{nat}"), "AllocationId"),
                "SubnetId": reference(&format!("PublicSubnet{nat}")),
            }),
        );
    }

    for az in 0..max_azs {
        let table = format!("PrivateRouteTable{az}");
        stack.resource(&table, RouteTable, json!({ "VpcId": reference("Vpc") }));
        if nat_gateways > 0 {
            stack.resource(
                format!("PrivateDefaultRoute{az}"),
                Route,
                json!({
                    "RouteTableId": reference(&table),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": reference(&format!("NatGateway{}", az % nat_gateways)),
                }),
            );
        }
        stack.resource(
            format!("PrivateSubnet{az}RouteTableAssociation"),
            SubnetRouteTableAssociation,
            json!({
                "SubnetId": reference(&format!("PrivateSubnet{az}")),
                "RouteTableId": reference(&table),
            }),
        );
    }

    let ids = |prefix: &str| -> Vec<Value> {
        (0..max_azs)
            .map(|az| reference(&format!("{prefix}{az}")))
            .collect()
    };
    let zones = (0..max_azs)
        .map(|az| get_att(&format!("PublicSubnet{az}"), "AvailabilityZone"))
        .collect();

    stack.output("VpcId", reference("Vpc"));
    stack.output("VpcCidr", get_att("Vpc", "CidrBlock"));
    stack.output("PublicSubnetIds", join(",", ids("PublicSubnet")));
    stack.output("PrivateSubnetIds", join(",", ids("PrivateSubnet")));
    stack.output("AvailabilityZones", join(",", zones));

    stack
}

/// Provision (create mode) or adopt (import mode) the network.
pub async fn materialize<P: Provisioner>(
    provisioner: &P,
    config: &NetworkConfig,
    stack_name: &str,
) -> Result<NetworkHandle, DeployError> {
    match config {
        NetworkConfig::Import { .. } => Ok(NetworkHandle::imported(config)),
        NetworkConfig::Create {
            cidr,
            max_azs,
            nat_gateways,
        } => {
            tracing::info!(stack = stack_name, "materializing network layer");
            let stack = descriptor(stack_name, cidr, *max_azs, *nat_gateways);
            let handle = provisioner
                .create_or_update(&stack)
                .await
                .map_err(|e| DeployError::Provision {
                    layer: Layer::Network,
                    source: e,
                })?;
            read(provisioner, &handle).await
        }
    }
}

/// Reference the existing network without touching it.
pub async fn resolve<P: Provisioner>(
    provisioner: &P,
    config: &NetworkConfig,
    stack_name: &str,
) -> Result<NetworkHandle, DeployError> {
    match config {
        NetworkConfig::Import { .. } => Ok(NetworkHandle::imported(config)),
        NetworkConfig::Create { .. } => {
            let handle = outputs::locate(provisioner, Layer::Network, stack_name).await?;
            read(provisioner, &handle).await
        }
    }
}

async fn read<P: Provisioner>(
    provisioner: &P,
    handle: &StackHandle,
) -> Result<NetworkHandle, DeployError> {
    let layer = Layer::Network;
    Ok(NetworkHandle {
        vpc_id: outputs::require(provisioner, layer, handle, "VpcId").await?,
        cidr: outputs::require(provisioner, layer, handle, "VpcCidr").await?,
        availability_zones: outputs::require_list(provisioner, layer, handle, "AvailabilityZones")
            .await?,
        public_subnet_ids: outputs::require_list(provisioner, layer, handle, "PublicSubnetIds")
            .await?,
        private_subnet_ids: outputs::require_list(provisioner, layer, handle, "PrivateSubnetIds")
            .await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_public_and_private_subnet_per_az() {
        let stack = descriptor("app-network", "10.0.0.0/16", 3, 1);

        assert_eq!(stack.of_kind(ResourceKind::Subnet).count(), 6);
        assert_eq!(stack.of_kind(ResourceKind::NatGateway).count(), 1);
        assert!(stack.find("PrivateSubnet2").is_some());
        assert_eq!(
            stack.find("PrivateSubnet2").unwrap().properties["CidrBlock"]["Fn::Select"][0],
            json!(5)
        );
    }

    #[test]
    fn private_routes_share_nat_gateways_round_robin() {
        let stack = descriptor("app-network", "10.0.0.0/16", 3, 2);
        let route = stack.find("PrivateDefaultRoute2").unwrap();
        assert_eq!(route.properties["NatGatewayId"], reference("NatGateway0"));
    }

    #[test]
    fn no_nat_means_no_private_default_route() {
        let stack = descriptor("app-network", "10.0.0.0/16", 2, 0);
        assert!(stack.find("PrivateDefaultRoute0").is_none());
        assert_eq!(stack.of_kind(ResourceKind::Eip).count(), 0);
    }

    #[test]
    fn exports_handle_outputs() {
        let stack = descriptor("app-network", "10.0.0.0/16", 2, 1);
        let keys: Vec<_> = stack.outputs.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "VpcId",
                "VpcCidr",
                "PublicSubnetIds",
                "PrivateSubnetIds",
                "AvailabilityZones"
            ]
        );
    }
}
