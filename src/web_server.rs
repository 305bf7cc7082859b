use indexmap::IndexMap;
use log::info;

use crate::expr::{base64, join, pseudo, reference, tags, Value};
use crate::template::{
    CreationPolicy, Error, Handle, Mapping, Output, Parameter, Resource, Template,
};

pub const VERSION: &str = "2010-09-09";
pub const DESCRIPTION: &str = "Test template to take in new ami id from packer";
pub const INSTANCE_NAME: &str = "WebServerInstance";

const ALLOWED_INSTANCE_TYPES: [&str; 10] = [
    "t2.micro",
    "t2.small",
    "t2.medium",
    "m2.xlarge",
    "m2.2xlarge",
    "m2.4xlarge",
    "m3.medium",
    "m3.large",
    "m3.xlarge",
    "m3.2xlarge",
];

const HVM64_INSTANCE_TYPES: [&str; 7] = [
    "t2.micro",
    "t2.small",
    "t2.medium",
    "m3.medium",
    "m3.large",
    "m3.xlarge",
    "m3.2xlarge",
];

/// One network ACL entry: rule number, port range and direction.
struct AclRule {
    name: &'static str,
    rule_number: &'static str,
    from_port: &'static str,
    to_port: &'static str,
    egress: bool,
}

const ACL_RULES: [AclRule; 6] = [
    AclRule {
        name: "InboundHTTPNetworkAclEntry",
        rule_number: "100",
        from_port: "80",
        to_port: "80",
        egress: false,
    },
    AclRule {
        name: "InboundSSHNetworkAclEntry",
        rule_number: "101",
        from_port: "22",
        to_port: "22",
        egress: false,
    },
    AclRule {
        name: "InboundResponsePortsNetworkAclEntry",
        rule_number: "102",
        from_port: "1024",
        to_port: "65535",
        egress: false,
    },
    AclRule {
        name: "OutBoundHTTPNetworkAclEntry",
        rule_number: "100",
        from_port: "80",
        to_port: "80",
        egress: true,
    },
    AclRule {
        name: "OutBoundHTTPSNetworkAclEntry",
        rule_number: "101",
        from_port: "443",
        to_port: "443",
        egress: true,
    },
    AclRule {
        name: "OutBoundResponsePortsNetworkAclEntry",
        rule_number: "102",
        from_port: "1024",
        to_port: "65535",
        egress: true,
    },
];

struct Parameters {
    key_name: Handle,
    ami_id: Handle,
    ssh_location: Handle,
    instance_type: Handle,
}

/// Builds the single web server stack around a freshly baked image.
pub fn web_server_template(ami_id: &str) -> Result<Template, Error> {
    let mut template = Template::new();
    template.set_version(VERSION);
    template.set_description(DESCRIPTION);

    let parameters = add_parameters(&mut template, ami_id)?;
    template.add_mapping("AWSInstanceType2Arch", architecture_mapping())?;

    let application_tags = || tags([("Application", reference(pseudo::STACK_ID))]);

    let vpc = template.add_resource(
        "VPC",
        Resource::new("AWS::EC2::VPC")
            .property("CidrBlock", "10.0.0.0/16")
            .property("Tags", application_tags()),
    )?;

    let subnet = template.add_resource(
        "Subnet",
        Resource::new("AWS::EC2::Subnet")
            .property("CidrBlock", "10.0.0.0/24")
            .property("VpcId", &vpc)
            .property("Tags", application_tags()),
    )?;

    let internet_gateway = template.add_resource(
        "InternetGateway",
        Resource::new("AWS::EC2::InternetGateway").property("Tags", application_tags()),
    )?;

    let attach_gateway = template.add_resource(
        "AttachGateway",
        Resource::new("AWS::EC2::VPCGatewayAttachment")
            .property("VpcId", &vpc)
            .property("InternetGatewayId", &internet_gateway),
    )?;

    let route_table = template.add_resource(
        "RouteTable",
        Resource::new("AWS::EC2::RouteTable")
            .property("VpcId", &vpc)
            .property("Tags", application_tags()),
    )?;

    template.add_resource(
        "Route",
        Resource::new("AWS::EC2::Route")
            .depends_on(attach_gateway.name())
            .property("GatewayId", &internet_gateway)
            .property("DestinationCidrBlock", "0.0.0.0/0")
            .property("RouteTableId", &route_table),
    )?;

    template.add_resource(
        "SubnetRouteTableAssociation",
        Resource::new("AWS::EC2::SubnetRouteTableAssociation")
            .property("SubnetId", &subnet)
            .property("RouteTableId", &route_table),
    )?;

    let network_acl = template.add_resource(
        "NetworkAcl",
        Resource::new("AWS::EC2::NetworkAcl")
            .property("VpcId", &vpc)
            .property("Tags", application_tags()),
    )?;

    for rule in &ACL_RULES {
        template.add_resource(rule.name, acl_entry(&network_acl, rule))?;
    }

    template.add_resource(
        "SubnetNetworkAclAssociation",
        Resource::new("AWS::EC2::SubnetNetworkAclAssociation")
            .property("SubnetId", &subnet)
            .property("NetworkAclId", &network_acl),
    )?;

    let security_group = template.add_resource(
        "InstanceSecurityGroup",
        Resource::new("AWS::EC2::SecurityGroup")
            .property("GroupDescription", "Enable SSH access via port 22")
            .property(
                "SecurityGroupIngress",
                Value::list([
                    ingress_rule("22", parameters.ssh_location.reference()),
                    ingress_rule("80", Value::from("0.0.0.0/0")),
                ]),
            )
            .property("VpcId", &vpc),
    )?;

    let instance = template.add_resource(
        INSTANCE_NAME,
        Resource::new("AWS::EC2::Instance")
            .metadata(instance_metadata())
            .property("ImageId", &parameters.ami_id)
            .property("InstanceType", &parameters.instance_type)
            .property("KeyName", &parameters.key_name)
            .property(
                "NetworkInterfaces",
                Value::list([Value::object([
                    ("GroupSet", Value::list([&security_group])),
                    ("AssociatePublicIpAddress", Value::from("true")),
                    ("DeviceIndex", Value::from("0")),
                    ("DeleteOnTermination", Value::from("true")),
                    ("SubnetId", subnet.reference()),
                ])]),
            )
            .property("UserData", user_data())
            .property("Tags", application_tags())
            .creation_policy(CreationPolicy::signal_timeout("PT15M")),
    )?;

    template.add_resource(
        "IPAddress",
        Resource::new("AWS::EC2::EIP")
            .depends_on(attach_gateway.name())
            .property("Domain", "vpc")
            .property("InstanceId", &instance),
    )?;

    template.add_output(
        "URL",
        Output::new(join(
            "",
            [
                Value::from("http://"),
                instance.get_att("PublicIp"),
                Value::from("/test.txt"),
            ],
        ))
        .description("Newly created application URL"),
    )?;

    info!("Generated web server template for image {}", ami_id);
    return Ok(template);
}

fn add_parameters(template: &mut Template, ami_id: &str) -> Result<Parameters, Error> {
    let key_name = template.add_parameter(
        "KeyName",
        Parameter::new("AWS::EC2::KeyPair::KeyName")
            .description("Name of an existing EC2 KeyPair to enable SSH access to the instance")
            .default("keyname")
            .constraint_description("must be the name of an existing EC2 KeyPair."),
    )?;

    let ami_id = template.add_parameter(
        "AMIID",
        Parameter::new("String")
            .description("AMI ID of the new image")
            .default(ami_id)
            .constraint_description("AMI ID of the new image"),
    )?;

    let ssh_location = template.add_parameter(
        "SSHLocation",
        Parameter::new("String")
            .description(" The IP address range that can be used to SSH to the EC2 instances")
            .length(9, 18)
            .default("0.0.0.0/0")
            .allowed_pattern(r"(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})/(\d{1,2})")
            .constraint_description("must be a valid IP CIDR range of the form x.x.x.x/x."),
    )?;

    let instance_type = template.add_parameter(
        "InstanceType",
        Parameter::new("String")
            .description("WebServer EC2 instance type")
            .default("t2.micro")
            .allowed_values(ALLOWED_INSTANCE_TYPES)
            .constraint_description("must be a valid EC2 instance type."),
    )?;

    return Ok(Parameters {
        key_name,
        ami_id,
        ssh_location,
        instance_type,
    });
}

fn architecture_mapping() -> Mapping {
    HVM64_INSTANCE_TYPES
        .iter()
        .map(|instance_type| {
            let mut row = IndexMap::new();
            row.insert(String::from("Arch"), Value::from("HVM64"));
            (instance_type.to_string(), row)
        })
        .collect()
}

fn acl_entry(network_acl: &Handle, rule: &AclRule) -> Resource {
    Resource::new("AWS::EC2::NetworkAclEntry")
        .property("NetworkAclId", network_acl)
        .property("RuleNumber", rule.rule_number)
        .property("Protocol", "6")
        .property(
            "PortRange",
            Value::object([
                ("To", Value::from(rule.to_port)),
                ("From", Value::from(rule.from_port)),
            ]),
        )
        .property("Egress", if rule.egress { "true" } else { "false" })
        .property("RuleAction", "allow")
        .property("CidrBlock", "0.0.0.0/0")
}

fn ingress_rule(port: &str, cidr: Value) -> Value {
    Value::object([
        ("IpProtocol", Value::from("tcp")),
        ("FromPort", Value::from(port)),
        ("ToPort", Value::from(port)),
        ("CidrIp", cidr),
    ])
}

fn cfn_init_command(tool: &str) -> Vec<Value> {
    vec![
        Value::from(format!("/opt/aws/bin/{} ", tool)),
        Value::from("         --stack "),
        reference(pseudo::STACK_NAME),
        Value::from(format!("         --resource {} ", INSTANCE_NAME)),
        Value::from("         --region "),
        reference(pseudo::REGION),
        Value::from("\n"),
    ]
}

fn user_data() -> Value {
    let mut lines = vec![
        Value::from("#!/bin/bash -xe\n"),
        Value::from("yum update -y aws-cfn-bootstrap\n"),
    ];
    lines.extend(cfn_init_command("cfn-init -v"));
    lines.extend(cfn_init_command("cfn-signal -e $?"));

    base64(join("", lines))
}

fn instance_metadata() -> Value {
    let hup_config = Value::object([
        (
            "content",
            join(
                "",
                [
                    Value::from("[main]\n"),
                    Value::from("stack="),
                    reference(pseudo::STACK_ID),
                    Value::from("\n"),
                    Value::from("region="),
                    reference(pseudo::REGION),
                    Value::from("\n"),
                ],
            ),
        ),
        ("mode", Value::from("000400")),
        ("owner", Value::from("root")),
        ("group", Value::from("root")),
    ]);

    let mut reloader_lines = vec![
        Value::from("[cfn-auto-reloader-hook]\n"),
        Value::from("triggers=post.update\n"),
        Value::from(format!(
            "path=Resources.{}.Metadata.AWS::CloudFormation::Init\n",
            INSTANCE_NAME
        )),
        Value::from("action="),
    ];
    reloader_lines.extend(cfn_init_command("cfn-init -v"));
    reloader_lines.push(Value::from("runas=root\n"));
    let reloader_hook = Value::object([("content", join("", reloader_lines))]);

    let config = Value::object([
        (
            "packages",
            Value::object([("yum", Value::object([("httpd", Value::List(Vec::new()))]))]),
        ),
        (
            "commands",
            Value::object([(
                "copytest",
                Value::object([(
                    "command",
                    Value::from("cp /home/ec2-user/test.txt /var/www/html/"),
                )]),
            )]),
        ),
        (
            "files",
            Value::object([
                ("/etc/cfn/cfn-hup.conf", hup_config),
                ("/etc/cfn/hooks.d/cfn-auto-reloader.conf", reloader_hook),
            ]),
        ),
        (
            "services",
            Value::object([(
                "sysvinit",
                Value::object([
                    (
                        "httpd",
                        Value::object([
                            ("enabled", Value::from(true)),
                            ("ensureRunning", Value::from(true)),
                        ]),
                    ),
                    (
                        "cfn-hup",
                        Value::object([
                            ("enabled", Value::from(true)),
                            ("ensureRunning", Value::from(true)),
                            (
                                "files",
                                Value::list([
                                    "/etc/cfn/cfn-hup.conf",
                                    "/etc/cfn/hooks.d/cfn-auto-reloader.conf",
                                ]),
                            ),
                        ]),
                    ),
                ]),
            )]),
        ),
    ]);

    Value::object([(
        "AWS::CloudFormation::Init",
        Value::object([("config", config)]),
    )])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{web_server_template, INSTANCE_NAME};
    use crate::template::Error;

    const AMI: &str = "ami-0123456789abcdef0";

    #[test]
    fn declares_every_logical_name() {
        let rendered = web_server_template(AMI).unwrap().render().unwrap();

        let resources: Vec<&String> = rendered["Resources"].as_object().unwrap().keys().collect();
        assert_eq!(
            vec![
                "VPC",
                "Subnet",
                "InternetGateway",
                "AttachGateway",
                "RouteTable",
                "Route",
                "SubnetRouteTableAssociation",
                "NetworkAcl",
                "InboundHTTPNetworkAclEntry",
                "InboundSSHNetworkAclEntry",
                "InboundResponsePortsNetworkAclEntry",
                "OutBoundHTTPNetworkAclEntry",
                "OutBoundHTTPSNetworkAclEntry",
                "OutBoundResponsePortsNetworkAclEntry",
                "SubnetNetworkAclAssociation",
                "InstanceSecurityGroup",
                "WebServerInstance",
                "IPAddress",
            ],
            resources
        );

        let parameters: Vec<&String> = rendered["Parameters"].as_object().unwrap().keys().collect();
        assert_eq!(
            vec!["KeyName", "AMIID", "SSHLocation", "InstanceType"],
            parameters
        );
        assert_eq!(true, rendered["Mappings"]["AWSInstanceType2Arch"].is_object());
        assert_eq!(true, rendered["Outputs"]["URL"].is_object());
    }

    #[test]
    fn image_id_becomes_parameter_default() {
        let rendered = web_server_template(AMI).unwrap().render().unwrap();

        assert_eq!(json!(AMI), rendered["Parameters"]["AMIID"]["Default"]);
        assert_eq!(
            json!({"Ref": "AMIID"}),
            rendered["Resources"][INSTANCE_NAME]["Properties"]["ImageId"]
        );
        assert_eq!("2010-09-09", rendered["AWSTemplateFormatVersion"]);
    }

    #[test]
    fn instance_carries_signal_timeout_and_bootstrap() {
        let rendered = web_server_template(AMI).unwrap().render().unwrap();
        let instance = &rendered["Resources"][INSTANCE_NAME];

        assert_eq!(
            json!({"ResourceSignal": {"Timeout": "PT15M"}}),
            instance["CreationPolicy"]
        );
        assert_eq!(true, instance["Properties"]["UserData"]["Fn::Base64"].is_object());
        assert_eq!(
            json!(true),
            instance["Metadata"]["AWS::CloudFormation::Init"]["config"]["services"]["sysvinit"]
                ["httpd"]["ensureRunning"]
        );
    }

    #[test]
    fn gateway_dependents_wait_for_attachment() {
        let rendered = web_server_template(AMI).unwrap().render().unwrap();

        assert_eq!(json!("AttachGateway"), rendered["Resources"]["Route"]["DependsOn"]);
        assert_eq!(
            json!("AttachGateway"),
            rendered["Resources"]["IPAddress"]["DependsOn"]
        );
    }

    #[test]
    fn url_output_joins_public_ip() {
        let rendered = web_server_template(AMI).unwrap().render().unwrap();

        assert_eq!(
            json!({"Fn::Join": ["", ["http://", {"Fn::GetAtt": ["WebServerInstance", "PublicIp"]}, "/test.txt"]]}),
            rendered["Outputs"]["URL"]["Value"]
        );
    }

    #[test]
    fn all_references_resolve() {
        let template = web_server_template(AMI).unwrap();
        assert_eq!(Ok::<(), Error>(()), template.validate_references());
    }
}
