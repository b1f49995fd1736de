use crate::app::units::warehouse::managed_policy_arn;
use crate::app::units::{slots, NETWORK_FOUNDATION};
use crate::domain::model::{
    asset_bucket, AssetSource, Handle, HandleKind, NetworkHandle, Resource, SecurityGroupHandle,
    StackTemplate, Token, ASSET_BUCKET,
};
use crate::domain::ports::{OutputSlot, Unit, UnitContext, UnitOutput};
use crate::utils::error::Result;
use serde_json::{json, Value};

pub const NETWORK_CIDR: &str = "10.80.0.0/20";
pub const ZONE_SUFFIXES: [char; 3] = ['a', 'b', 'c'];
pub const SECURITY_GROUP_NAME: &str = "redshift-serverless-sg";

/// Host bits per subnet: six equal /23 subnets out of the /20.
const SUBNET_HOST_BITS: &str = "9";

const VPC_ID: &str = "InfraNetwork";
const IGW_ID: &str = "InfraNetworkIGW";
const SG_ID: &str = "RedshiftServerlessSg";

pub const DATASET_ASSET_ID: &str = "SyntheticDataset";
pub const DATA_BUCKET_ID: &str = "SyntheticData";
const DEPLOYMENT_ID: &str = "SyntheticDataDeployment";
const DEPLOYMENT_HANDLER_ID: &str = "SyntheticDataDeploymentHandler";
const DEPLOYMENT_ROLE_ID: &str = "SyntheticDataDeploymentHandlerRole";
const DEPLOYMENT_POLICY_ID: &str = "SyntheticDataDeploymentHandlerPolicy";
const DEPLOYMENT_TIMEOUT_SECONDS: u32 = 300;

/// 自訂資源的處理函式：把資產 zip 解開後逐檔寫入目標 bucket。
/// 刪除時保留 bucket 內容。
const DEPLOYMENT_HANDLER_SOURCE: &str = r#"import io
import zipfile

import boto3
import cfnresponse

s3 = boto3.client("s3")


def handler(event, context):
    props = event["ResourceProperties"]
    try:
        if event["RequestType"] in ("Create", "Update"):
            destination = props["DestinationBucketName"]
            for bucket, key in zip(props["SourceBucketNames"], props["SourceObjectKeys"]):
                body = s3.get_object(Bucket=bucket, Key=key)["Body"].read()
                with zipfile.ZipFile(io.BytesIO(body)) as archive:
                    for name in archive.namelist():
                        if not name.endswith("/"):
                            s3.put_object(Bucket=destination, Key=name, Body=archive.read(name))
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {})
    except Exception as exc:
        cfnresponse.send(event, context, cfnresponse.FAILED, {"Error": str(exc)})
"#;

pub fn availability_zones(region: &str) -> Vec<String> {
    ZONE_SUFFIXES
        .iter()
        .map(|suffix| format!("{}{}", region, suffix))
        .collect()
}

/// Private network with a public and a private-with-egress tier per zone,
/// the security group the warehouse attaches to, and the bucket holding
/// the synthetic training dataset.
#[derive(Debug, Default)]
pub struct NetworkFoundation;

impl NetworkFoundation {
    pub fn new() -> Self {
        Self
    }

    fn subnet_cidr(index: usize, total: usize) -> Value {
        json!({
            "Fn::Select": [
                index,
                { "Fn::Cidr": [{ "Fn::GetAtt": [VPC_ID, "CidrBlock"] }, total, SUBNET_HOST_BITS] }
            ]
        })
    }

    /// 合成資料集：bucket 加上把本機目錄上傳進去的自訂資源
    fn add_dataset(template: &mut StackTemplate, dataset_path: &str) {
        let dataset_key = template.add_asset(AssetSource::new(DATASET_ASSET_ID, dataset_path));

        template.add_resource(Resource::new(DATA_BUCKET_ID, "AWS::S3::Bucket", json!({})).retain());

        template.add_resource(Resource::new(
            DEPLOYMENT_ROLE_ID,
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" }
                    }]
                },
                "ManagedPolicyArns": [managed_policy_arn("service-role/AWSLambdaBasicExecutionRole")]
            }),
        ));

        // 只能讀資產 bucket、寫資料 bucket
        template.add_resource(Resource::new(
            DEPLOYMENT_POLICY_ID,
            "AWS::IAM::Policy",
            json!({
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [
                        {
                            "Action": "s3:GetObject",
                            "Effect": "Allow",
                            "Resource": { "Fn::Sub": format!("arn:${{AWS::Partition}}:s3:::{}/*", ASSET_BUCKET) }
                        },
                        {
                            "Action": "s3:PutObject",
                            "Effect": "Allow",
                            "Resource": {
                                "Fn::Join": ["", [{ "Fn::GetAtt": [DATA_BUCKET_ID, "Arn"] }, "/*"]]
                            }
                        }
                    ]
                },
                "PolicyName": DEPLOYMENT_POLICY_ID,
                "Roles": [{ "Ref": DEPLOYMENT_ROLE_ID }]
            }),
        ));

        template.add_resource(
            Resource::new(
                DEPLOYMENT_HANDLER_ID,
                "AWS::Lambda::Function",
                json!({
                    "Code": { "ZipFile": DEPLOYMENT_HANDLER_SOURCE },
                    "Handler": "index.handler",
                    "Runtime": "python3.12",
                    "Timeout": DEPLOYMENT_TIMEOUT_SECONDS,
                    "Role": { "Fn::GetAtt": [DEPLOYMENT_ROLE_ID, "Arn"] }
                }),
            )
            .depends_on(DEPLOYMENT_POLICY_ID)
            .depends_on(DEPLOYMENT_ROLE_ID),
        );

        template.add_resource(Resource::new(
            DEPLOYMENT_ID,
            "Custom::CDKBucketDeployment",
            json!({
                "ServiceToken": { "Fn::GetAtt": [DEPLOYMENT_HANDLER_ID, "Arn"] },
                "SourceBucketNames": [asset_bucket()],
                "SourceObjectKeys": [dataset_key],
                "DestinationBucketName": { "Ref": DATA_BUCKET_ID }
            }),
        ));

        template.add_output("SyntheticDataBucket", json!({ "Ref": DATA_BUCKET_ID }));
    }

    fn add_subnet(
        template: &mut StackTemplate,
        tier: &str,
        number: usize,
        zone: &str,
        cidr: Value,
        public: bool,
    ) -> String {
        let subnet_id = format!("{}Subnet{}", tier, number);
        let route_table_id = format!("{}RouteTable", subnet_id);
        let subnet_type = if public { "Public" } else { "Private" };

        template.add_resource(Resource::new(
            &subnet_id,
            "AWS::EC2::Subnet",
            json!({
                "VpcId": { "Ref": VPC_ID },
                "AvailabilityZone": zone,
                "CidrBlock": cidr,
                "MapPublicIpOnLaunch": public,
                "Tags": [
                    { "Key": "Name", "Value": format!("{}/{}{}", NETWORK_FOUNDATION, tier, number) },
                    { "Key": "subnet-type", "Value": subnet_type }
                ]
            }),
        ));
        template.add_resource(Resource::new(
            &route_table_id,
            "AWS::EC2::RouteTable",
            json!({ "VpcId": { "Ref": VPC_ID } }),
        ));
        template.add_resource(Resource::new(
            &format!("{}Association", subnet_id),
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": { "Ref": route_table_id },
                "SubnetId": { "Ref": subnet_id }
            }),
        ));

        subnet_id
    }
}

impl Unit for NetworkFoundation {
    fn name(&self) -> &str {
        NETWORK_FOUNDATION
    }

    fn outputs(&self) -> Vec<OutputSlot> {
        vec![
            OutputSlot::new(slots::NETWORK, HandleKind::Network),
            OutputSlot::new(slots::SECURITY_GROUP, HandleKind::SecurityGroup),
        ]
    }

    fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput> {
        let zones = availability_zones(ctx.config.region());
        tracing::debug!("Availability zones: {}", zones.join(", "));

        let mut template = StackTemplate::new(NETWORK_FOUNDATION)
            .with_description("Private network for the loan remediation warehouse");

        // 建立 VPC 與網際網路閘道
        template.add_resource(Resource::new(
            VPC_ID,
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": NETWORK_CIDR,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": [{ "Key": "Name", "Value": format!("{}/{}", NETWORK_FOUNDATION, VPC_ID) }]
            }),
        ));
        template.add_resource(Resource::new(IGW_ID, "AWS::EC2::InternetGateway", json!({})));
        template.add_resource(Resource::new(
            "InfraNetworkVPCGW",
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": { "Ref": VPC_ID },
                "InternetGatewayId": { "Ref": IGW_ID }
            }),
        ));

        let total_subnets = zones.len() * 2;
        let mut public_subnets = Vec::new();
        let mut private_subnets = Vec::new();

        for (i, zone) in zones.iter().enumerate() {
            let number = i + 1;
            let subnet_id = Self::add_subnet(
                &mut template,
                "Public",
                number,
                zone,
                Self::subnet_cidr(i, total_subnets),
                true,
            );
            template.add_resource(
                Resource::new(
                    &format!("{}DefaultRoute", subnet_id),
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": { "Ref": format!("{}RouteTable", subnet_id) },
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": { "Ref": IGW_ID }
                    }),
                )
                .depends_on("InfraNetworkVPCGW"),
            );
            template.add_resource(Resource::new(
                &format!("{}EIP", subnet_id),
                "AWS::EC2::EIP",
                json!({ "Domain": "vpc" }),
            ));
            template.add_resource(Resource::new(
                &format!("{}NATGateway", subnet_id),
                "AWS::EC2::NatGateway",
                json!({
                    "SubnetId": { "Ref": subnet_id },
                    "AllocationId": { "Fn::GetAtt": [format!("{}EIP", subnet_id), "AllocationId"] }
                }),
            ));
            public_subnets.push(subnet_id);
        }

        for (i, zone) in zones.iter().enumerate() {
            let number = i + 1;
            let subnet_id = Self::add_subnet(
                &mut template,
                "Private",
                number,
                zone,
                Self::subnet_cidr(zones.len() + i, total_subnets),
                false,
            );
            // Egress leaves through the NAT gateway in the same zone.
            template.add_resource(Resource::new(
                &format!("{}DefaultRoute", subnet_id),
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": { "Ref": format!("{}RouteTable", subnet_id) },
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": { "Ref": format!("{}NATGateway", public_subnets[i]) }
                }),
            ));
            private_subnets.push(subnet_id);
        }

        template.add_resource(Resource::new(
            SG_ID,
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupName": SECURITY_GROUP_NAME,
                "GroupDescription": format!("{}/{}", NETWORK_FOUNDATION, SECURITY_GROUP_NAME),
                "VpcId": { "Ref": VPC_ID },
                "SecurityGroupEgress": [{
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1"
                }]
            }),
        ));

        Self::add_dataset(&mut template, ctx.config.dataset_path());

        let to_tokens = |ids: &[String]| -> Vec<Token> {
            ids.iter()
                .map(|id| Token::reference(NETWORK_FOUNDATION, id))
                .collect()
        };

        let network = NetworkHandle {
            vpc_id: Token::reference(NETWORK_FOUNDATION, VPC_ID),
            cidr: NETWORK_CIDR.to_string(),
            availability_zones: zones,
            public_subnet_ids: to_tokens(&public_subnets),
            private_subnet_ids: to_tokens(&private_subnets),
        };
        let security_group = SecurityGroupHandle {
            name: SECURITY_GROUP_NAME.to_string(),
            group_id: Token::attr(NETWORK_FOUNDATION, SG_ID, "GroupId"),
        };

        Ok(UnitOutput::new(template)
            .publish(slots::NETWORK, Handle::Network(network))
            .publish(slots::SECURITY_GROUP, Handle::SecurityGroup(security_group)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalConfig;
    use crate::domain::ports::BoundInputs;

    fn build(config: &ExternalConfig) -> UnitOutput {
        let inputs = BoundInputs::new(NETWORK_FOUNDATION);
        NetworkFoundation::new()
            .construct(&UnitContext {
                config,
                inputs: &inputs,
            })
            .unwrap()
    }

    #[test]
    fn test_default_region_yields_three_zones() {
        let output = build(&ExternalConfig::default());
        let Handle::Network(network) = &output.handles[slots::NETWORK] else {
            panic!("network slot holds the wrong handle");
        };
        assert_eq!(
            network.availability_zones,
            vec!["eu-north-1a", "eu-north-1b", "eu-north-1c"]
        );
        assert_eq!(network.public_subnet_ids.len(), 3);
        assert_eq!(network.private_subnet_ids.len(), 3);
        assert_eq!(network.cidr, NETWORK_CIDR);
    }

    #[test]
    fn test_zones_follow_configured_region() {
        let output = build(&ExternalConfig::default().with_region("us-east-1"));
        let zones: Vec<&str> = output
            .template
            .resources_of_type("AWS::EC2::Subnet")
            .map(|r| r.properties["AvailabilityZone"].as_str().unwrap())
            .collect();
        assert_eq!(
            zones,
            vec!["us-east-1a", "us-east-1b", "us-east-1c", "us-east-1a", "us-east-1b", "us-east-1c"]
        );
    }

    #[test]
    fn test_private_tier_routes_through_nat() {
        let output = build(&ExternalConfig::default());
        let route = output.template.resource("PrivateSubnet2DefaultRoute").unwrap();
        assert_eq!(
            route.properties["NatGatewayId"],
            json!({ "Ref": "PublicSubnet2NATGateway" })
        );
        let private = output.template.resource("PrivateSubnet1").unwrap();
        assert_eq!(private.properties["MapPublicIpOnLaunch"], json!(false));
        assert_eq!(private.properties["CidrBlock"]["Fn::Select"][0], json!(3));
    }

    #[test]
    fn test_security_group_allows_egress_only() {
        let output = build(&ExternalConfig::default());
        let sg = output.template.resource(SG_ID).unwrap();
        assert_eq!(sg.properties["GroupName"], SECURITY_GROUP_NAME);
        assert_eq!(sg.properties["SecurityGroupEgress"][0]["CidrIp"], "0.0.0.0/0");
        assert!(sg.properties.get("SecurityGroupIngress").is_none());
    }

    #[test]
    fn test_dataset_bucket_is_retained_and_filled_from_asset() {
        let output = build(&ExternalConfig::default().with_dataset_path("data/synthetic"));

        let bucket = output.template.resource(DATA_BUCKET_ID).unwrap();
        assert_eq!(bucket.resource_type, "AWS::S3::Bucket");
        assert_eq!(bucket.deletion_policy.as_deref(), Some("Retain"));

        let assets = output.template.assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, DATASET_ASSET_ID);
        assert_eq!(assets[0].path, "data/synthetic");

        let deployment = output.template.resource(DEPLOYMENT_ID).unwrap();
        assert_eq!(
            deployment.properties["DestinationBucketName"],
            json!({ "Ref": DATA_BUCKET_ID })
        );
        assert_eq!(
            deployment.properties["SourceObjectKeys"],
            json!([assets[0].key_placeholder()])
        );
        assert_eq!(
            deployment.properties["ServiceToken"],
            json!({ "Fn::GetAtt": [DEPLOYMENT_HANDLER_ID, "Arn"] })
        );
    }

    #[test]
    fn test_dataset_handler_can_only_write_to_data_bucket() {
        let output = build(&ExternalConfig::default());
        let policy = output.template.resource(DEPLOYMENT_POLICY_ID).unwrap();
        let statements = policy.properties["PolicyDocument"]["Statement"].as_array().unwrap();

        let actions: Vec<&str> = statements.iter().map(|s| s["Action"].as_str().unwrap()).collect();
        assert_eq!(actions, vec!["s3:GetObject", "s3:PutObject"]);
        assert_eq!(
            statements[1]["Resource"]["Fn::Join"][1][0],
            json!({ "Fn::GetAtt": [DATA_BUCKET_ID, "Arn"] })
        );

        let handler = output.template.resource(DEPLOYMENT_HANDLER_ID).unwrap();
        assert!(handler.properties["Code"]["ZipFile"]
            .as_str()
            .unwrap()
            .contains("cfnresponse.send"));
    }
}
