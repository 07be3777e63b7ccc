//! Cloud inventory discovery: running instances become hosts, load
//! balancers become ELB nodes with a fact per registered member.

use std::sync::Arc;

use async_trait::async_trait;

use topomap_core::{alias, HostEndpoint, Node, ProbeFact, ScanItem};

use crate::cloud::{CloudInventory, InstanceRecord, LoadBalancerRecord};
use crate::error::Result;
use crate::scanner::DiscoveryScanner;

pub struct CloudScanner {
    inventory: Arc<dyn CloudInventory>,
    filters: Vec<String>,
}

impl CloudScanner {
    pub fn new(inventory: Arc<dyn CloudInventory>, filters: Vec<String>) -> Self {
        Self { inventory, filters }
    }
}

/// Convert an instance into a host node. Instances with no address at all
/// are still listed but carry no endpoint, so remote probes skip them.
fn instance_node(instance: &InstanceRecord) -> Node {
    let name = instance
        .tags
        .get("Name")
        .filter(|n| !n.is_empty())
        .cloned()
        .unwrap_or_else(|| instance.id.clone());

    let address = instance
        .public_address
        .as_ref()
        .or(instance.private_address.as_ref());

    let mut node = match address {
        Some(address) => Node::host(&instance.id, name, HostEndpoint::new(address.as_str())),
        None => {
            tracing::warn!(instance = %instance.id, "Instance has no address; it will not be probed");
            Node::unreachable_host(&instance.id, name)
        }
    };
    for ip in [&instance.private_address, &instance.public_address]
        .into_iter()
        .flatten()
    {
        node.add_alias(alias::ip(ip));
    }
    if let Some(dns) = &instance.private_dns {
        node.add_alias(alias::host(dns));
    }
    node
}

fn load_balancer_items(lb: &LoadBalancerRecord) -> Vec<ScanItem> {
    let mut node = Node::elb(&lb.name, &lb.name, lb.dns_name.clone());
    if let Some(dns) = &lb.dns_name {
        node.add_alias(alias::host(dns));
    }

    let mut items = Vec::with_capacity(lb.member_instance_ids.len() + 1);
    let id = node.id().clone();
    items.push(ScanItem::Node(node));
    items.extend(
        lb.member_instance_ids
            .iter()
            .map(|member| ScanItem::Fact(ProbeFact::forward(&id, alias::id(member)))),
    );
    items
}

#[async_trait]
impl DiscoveryScanner for CloudScanner {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn list(&self) -> Result<Vec<ScanItem>> {
        let instances = self.inventory.list_running_instances(&self.filters).await?;
        let balancers = self.inventory.list_load_balancers().await?;

        tracing::info!(
            instances = instances.len(),
            load_balancers = balancers.len(),
            "Cloud inventory listed"
        );

        let mut items: Vec<ScanItem> = instances.iter().map(|i| instance_node(i).into()).collect();
        items.extend(balancers.iter().flat_map(load_balancer_items));
        Ok(items)
    }
}
