//! Cloud inventory client.
//!
//! [`AwsCliInventory`] wraps the `aws` CLI with `--output json` and
//! deserializes the responses into typed records with serde, the same way
//! any other tool output is handled: run the process, check the exit
//! status, parse stdout.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::CloudConfig;
use crate::error::{DiscoverError, Result};

/// A running compute instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub private_dns: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub security_groups: Vec<String>,
}

/// A load balancer and the instances registered behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerRecord {
    pub name: String,
    pub dns_name: Option<String>,
    pub member_instance_ids: Vec<String>,
}

/// Enumerates cloud resources.
#[async_trait]
pub trait CloudInventory: Send + Sync {
    /// Running instances matching every filter (`Name=...,Values=...`).
    async fn list_running_instances(&self, filters: &[String]) -> Result<Vec<InstanceRecord>>;

    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancerRecord>>;
}

// ── CLI response shapes ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<AwsInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsInstance {
    instance_id: String,
    public_ip_address: Option<String>,
    private_ip_address: Option<String>,
    private_dns_name: Option<String>,
    #[serde(default)]
    tags: Vec<AwsTag>,
    #[serde(default)]
    security_groups: Vec<AwsSecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsTag {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsSecurityGroup {
    group_name: Option<String>,
    group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLoadBalancers {
    #[serde(default)]
    load_balancer_descriptions: Vec<AwsLoadBalancer>,
}

#[derive(Debug, Deserialize)]
struct AwsLoadBalancer {
    #[serde(rename = "LoadBalancerName")]
    name: String,
    #[serde(rename = "DNSName")]
    dns_name: Option<String>,
    #[serde(rename = "Instances", default)]
    instances: Vec<AwsMember>,
}

#[derive(Debug, Deserialize)]
struct AwsMember {
    #[serde(rename = "InstanceId")]
    instance_id: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse `aws ec2 describe-instances --output json`.
pub fn parse_instances(json: &[u8]) -> Result<Vec<InstanceRecord>> {
    let parsed: DescribeInstances = serde_json::from_slice(json)
        .map_err(|e| DiscoverError::Cloud(format!("unparsable describe-instances output: {e}")))?;

    Ok(parsed
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(|i| InstanceRecord {
            id: i.instance_id,
            public_address: non_empty(i.public_ip_address),
            private_address: non_empty(i.private_ip_address),
            private_dns: non_empty(i.private_dns_name),
            tags: i.tags.into_iter().map(|t| (t.key, t.value)).collect(),
            security_groups: i
                .security_groups
                .into_iter()
                .filter_map(|g| g.group_name.or(g.group_id))
                .collect(),
        })
        .collect())
}

/// Parse `aws elb describe-load-balancers --output json`.
pub fn parse_load_balancers(json: &[u8]) -> Result<Vec<LoadBalancerRecord>> {
    let parsed: DescribeLoadBalancers = serde_json::from_slice(json)
        .map_err(|e| DiscoverError::Cloud(format!("unparsable describe-load-balancers output: {e}")))?;

    Ok(parsed
        .load_balancer_descriptions
        .into_iter()
        .map(|lb| LoadBalancerRecord {
            name: lb.name,
            dns_name: non_empty(lb.dns_name),
            member_instance_ids: lb.instances.into_iter().map(|m| m.instance_id).collect(),
        })
        .collect())
}

/// Wrapper around the `aws` binary.
pub struct AwsCliInventory {
    config: CloudConfig,
}

impl AwsCliInventory {
    pub fn new(config: CloudConfig) -> Self {
        Self { config }
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--output".to_string(), "json".to_string()];
        if let Some(region) = &self.config.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.config.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    async fn invoke(&self, args: &[String]) -> Result<Vec<u8>> {
        tracing::debug!(binary = %self.config.binary, args = ?args, "Invoking cloud CLI");

        let output = Command::new(&self.config.binary)
            .args(args)
            .args(self.global_args())
            .output()
            .await
            .map_err(|e| DiscoverError::Cloud(format!("{}: {e}", self.config.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DiscoverError::Cloud(format!(
                "`{} {}` exited with code {}: {stderr}",
                self.config.binary,
                args.join(" "),
                output.status.code().unwrap_or(-1)
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl CloudInventory for AwsCliInventory {
    async fn list_running_instances(&self, filters: &[String]) -> Result<Vec<InstanceRecord>> {
        let mut args = vec![
            "ec2".to_string(),
            "describe-instances".to_string(),
            "--filters".to_string(),
            "Name=instance-state-name,Values=running".to_string(),
        ];
        args.extend(filters.iter().cloned());

        let stdout = self.invoke(&args).await?;
        parse_instances(&stdout)
    }

    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancerRecord>> {
        let args = vec!["elb".to_string(), "describe-load-balancers".to_string()];
        let stdout = self.invoke(&args).await?;
        parse_load_balancers(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCES: &str = r#"{
  "Reservations": [
    {
      "Instances": [
        {
          "InstanceId": "i-0abc",
          "PrivateIpAddress": "10.0.1.5",
          "PublicIpAddress": "54.1.2.3",
          "PrivateDnsName": "ip-10-0-1-5.ec2.internal",
          "State": {"Name": "running"},
          "Tags": [{"Key": "Name", "Value": "web-1"}, {"Key": "env", "Value": "prod"}],
          "SecurityGroups": [{"GroupName": "web", "GroupId": "sg-1"}]
        },
        {
          "InstanceId": "i-0def",
          "PrivateIpAddress": "10.0.1.6",
          "PrivateDnsName": ""
        }
      ]
    },
    {"Instances": []}
  ]
}"#;

    #[test]
    fn test_parse_instances() {
        let records = parse_instances(INSTANCES.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);

        let web = &records[0];
        assert_eq!(web.id, "i-0abc");
        assert_eq!(web.public_address.as_deref(), Some("54.1.2.3"));
        assert_eq!(web.private_dns.as_deref(), Some("ip-10-0-1-5.ec2.internal"));
        assert_eq!(web.tags.get("Name").map(String::as_str), Some("web-1"));
        assert_eq!(web.security_groups, vec!["web"]);

        let bare = &records[1];
        assert_eq!(bare.public_address, None);
        assert_eq!(bare.private_dns, None);
        assert!(bare.tags.is_empty());
    }

    #[test]
    fn test_parse_load_balancers() {
        let json = r#"{"LoadBalancerDescriptions": [
            {"LoadBalancerName": "front", "DNSName": "front-1.elb.amazonaws.com",
             "Instances": [{"InstanceId": "i-0abc"}, {"InstanceId": "i-0def"}]},
            {"LoadBalancerName": "idle"}
        ]}"#;
        let lbs = parse_load_balancers(json.as_bytes()).unwrap();

        assert_eq!(lbs.len(), 2);
        assert_eq!(lbs[0].name, "front");
        assert_eq!(lbs[0].dns_name.as_deref(), Some("front-1.elb.amazonaws.com"));
        assert_eq!(lbs[0].member_instance_ids, vec!["i-0abc", "i-0def"]);
        assert!(lbs[1].member_instance_ids.is_empty());
    }

    #[test]
    fn test_unparsable_output_is_cloud_error() {
        let err = parse_instances(b"not json").unwrap_err();
        assert!(matches!(err, DiscoverError::Cloud(_)));
        assert!(err.to_string().contains("describe-instances"));

        assert!(matches!(
            parse_load_balancers(b"{\"LoadBalancerDescriptions\": 7}"),
            Err(DiscoverError::Cloud(_))
        ));
    }

    #[test]
    fn test_global_args() {
        let inventory = AwsCliInventory::new(CloudConfig {
            region: Some("eu-west-1".to_string()),
            profile: Some("audit".to_string()),
            ..Default::default()
        });
        assert_eq!(
            inventory.global_args(),
            vec!["--output", "json", "--region", "eu-west-1", "--profile", "audit"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_cloud_error() {
        let inventory = AwsCliInventory::new(CloudConfig {
            binary: "/nonexistent/aws".to_string(),
            ..Default::default()
        });
        let result = inventory.list_load_balancers().await;
        assert!(matches!(result, Err(DiscoverError::Cloud(_))));
    }
}
