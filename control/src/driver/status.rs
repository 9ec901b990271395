//! Ingress load-balancer status
//!
//! Every managed ingress reports, per host, the address clients should
//! CNAME to: the domain's custom target when one is assigned, otherwise its
//! managed hostname with any wildcard prefix trimmed.

use crate::apis::metrics::record_apply;
use crate::client::ObjectClient;
use crate::error::Result;
use crate::store::{MirrorObject, ObjectKey, Store};
use common::crd::Domain;
use k8s_openapi::api::networking::v1::{
    Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};
use std::collections::BTreeSet;
use tracing::{debug, error, info};

/// Load balancer entries for an ingress, ordered by host
pub(crate) fn load_balancer_entries(
    ingress: &Ingress,
    domains: &[Domain],
) -> Vec<IngressLoadBalancerIngress> {
    let hosts: BTreeSet<&str> = ingress
        .spec
        .iter()
        .flat_map(|spec| spec.rules.iter().flatten())
        .filter_map(|rule| rule.host.as_deref())
        .collect();

    hosts
        .into_iter()
        .filter_map(|host| {
            let domain = domains.iter().find(|d| d.spec.domain == host)?;
            let status = domain.status.as_ref()?;
            let hostname = match status.cname_target.as_deref() {
                Some(target) if !target.is_empty() => target.to_string(),
                _ => status.domain.trim_start_matches("*.").to_string(),
            };
            if hostname.is_empty() {
                return None;
            }
            Some(IngressLoadBalancerIngress {
                hostname: Some(hostname),
                ..Default::default()
            })
        })
        .collect()
}

fn current_entries(ingress: &Ingress) -> &[IngressLoadBalancerIngress] {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_deref())
        .unwrap_or_default()
}

/// Write load balancer status for every managed ingress whose entries changed
pub(crate) async fn update_ingress_statuses(
    client: &dyn ObjectClient,
    store: &Store,
    domains: &[Domain],
) -> Result<()> {
    for ingress in store.list_managed_ingresses() {
        let key = ObjectKey::of(&*ingress);
        let wanted = load_balancer_entries(&ingress, domains);
        if current_entries(&ingress) == wanted.as_slice() {
            debug!("Ingress {} load balancer status unchanged", key);
            continue;
        }

        let mut updated = (*ingress).clone();
        updated.status = Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(wanted),
            }),
        });
        client
            .update_status(&updated.into_object())
            .await
            .map_err(|e| {
                error!("Failed to update status of ingress {}: {}", key, e);
                e
            })?;
        info!("Updated load balancer status of ingress {}", key);
        record_apply(Ingress::KIND.as_str(), "update_status");
    }
    Ok(())
}
