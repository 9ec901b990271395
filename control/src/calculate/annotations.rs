//! Ingress annotation resolution: ModuleSets and TrafficPolicies

use super::Calculator;
use crate::error::{Error, Result};
use common::crd::{ModuleSet, ModuleSetModules, TrafficPolicyResource};
use common::labels::{ANNOTATION_MODULES, ANNOTATION_TRAFFIC_POLICY};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde_json::Value;
use std::sync::Arc;

/// ModuleSet names listed on an ingress, in order
pub fn module_set_names(ingress: &Ingress) -> Vec<String> {
    ingress
        .annotations()
        .get(ANNOTATION_MODULES)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn traffic_policy_name(ingress: &Ingress) -> Option<String> {
    ingress
        .annotations()
        .get(ANNOTATION_TRAFFIC_POLICY)
        .map(|value| value.trim().to_string())
        .filter(|name| !name.is_empty())
}

impl Calculator<'_> {
    /// Resolve and merge every ModuleSet the ingress references
    pub(crate) fn modules_for_ingress(&self, ingress: &Ingress) -> Result<ModuleSetModules> {
        let namespace = ingress.namespace().unwrap_or_default();
        let mut modules = ModuleSetModules::default();
        for name in module_set_names(ingress) {
            let set = self.store.get::<ModuleSet>(&namespace, &name)?;
            modules.merge(&set.spec.modules);
        }
        Ok(modules)
    }

    pub(crate) fn traffic_policy_for_ingress(
        &self,
        ingress: &Ingress,
    ) -> Result<Option<Arc<TrafficPolicyResource>>> {
        let Some(name) = traffic_policy_name(ingress) else {
            return Ok(None);
        };
        let namespace = ingress.namespace().unwrap_or_default();
        self.store
            .get::<TrafficPolicyResource>(&namespace, &name)
            .map(Some)
    }

    /// The policy document attached to every route of an ingress
    ///
    /// Comes from the referenced TrafficPolicy, else from the merged
    /// ModuleSet's `policy` module. Setting both is a configuration error.
    pub(crate) fn route_policy_for_ingress(
        &self,
        ingress: &Ingress,
        modules: &ModuleSetModules,
    ) -> Result<Option<Value>> {
        let traffic_policy = self.traffic_policy_for_ingress(ingress)?;

        match (traffic_policy, &modules.policy) {
            (Some(_), Some(_)) => Err(Error::Config(format!(
                "cannot have both a traffic policy and a moduleset policy on ingress {}/{}",
                ingress.namespace().unwrap_or_default(),
                ingress.name_any()
            ))),
            (Some(tp), None) => Ok(tp.spec.policy.clone()),
            (None, policy) => Ok(policy.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fixtures::{ingress, module_set, settings, store, traffic_policy, with_annotation};
    use crate::store::MirrorObject;
    use common::crd::modules::{EndpointCompression, EndpointTLSTermination};
    use serde_json::json;

    fn annotated(key: &str, value: &str) -> Ingress {
        with_annotation(
            ingress("default", "web", "uid-1", Some("rauta"), &[]),
            key,
            value,
        )
    }

    #[test]
    fn test_module_set_names_split_and_trim() {
        let ing = annotated(ANNOTATION_MODULES, "base, tls ,,extra");
        assert_eq!(module_set_names(&ing), vec!["base", "tls", "extra"]);
        assert!(module_set_names(&ingress("default", "x", "u", None, &[])).is_empty());
    }

    #[test]
    fn test_module_sets_merge_in_order() {
        let store = store(false);
        store.update(
            module_set(
                "default",
                "base",
                ModuleSetModules {
                    compression: Some(EndpointCompression { enabled: false }),
                    tls_termination: Some(EndpointTLSTermination {
                        min_version: Some("1.2".to_string()),
                    }),
                    ..Default::default()
                },
            )
            .into_object(),
        );
        store.update(
            module_set(
                "default",
                "override",
                ModuleSetModules {
                    compression: Some(EndpointCompression { enabled: true }),
                    ..Default::default()
                },
            )
            .into_object(),
        );
        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);

        let modules = calc
            .modules_for_ingress(&annotated(ANNOTATION_MODULES, "base,override"))
            .unwrap();
        assert_eq!(modules.compression, Some(EndpointCompression { enabled: true }));
        assert!(modules.tls_termination.is_some());
    }

    #[test]
    fn test_missing_module_set_is_an_error() {
        let store = store(false);
        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);

        let err = calc
            .modules_for_ingress(&annotated(ANNOTATION_MODULES, "absent"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_traffic_policy_and_module_policy_conflict() {
        let store = store(false);
        store.update(traffic_policy("default", "tp", json!({"on_http_request": []})).into_object());
        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);
        let ing = annotated(ANNOTATION_TRAFFIC_POLICY, "tp");

        let with_module_policy = ModuleSetModules {
            policy: Some(json!({"inbound": []})),
            ..Default::default()
        };
        assert!(matches!(
            calc.route_policy_for_ingress(&ing, &with_module_policy),
            Err(Error::Config(_))
        ));

        let policy = calc
            .route_policy_for_ingress(&ing, &ModuleSetModules::default())
            .unwrap();
        assert_eq!(policy, Some(json!({"on_http_request": []})));
    }

    #[test]
    fn test_module_policy_used_without_traffic_policy() {
        let store = store(false);
        let settings = settings(false);
        let calc = Calculator::new(&store, &settings);
        let ing = ingress("default", "web", "uid-1", None, &[]);

        let modules = ModuleSetModules {
            policy: Some(json!({"inbound": [{"name": "deny"}]})),
            ..Default::default()
        };
        assert_eq!(
            calc.route_policy_for_ingress(&ing, &modules).unwrap(),
            modules.policy
        );
        assert_eq!(
            calc.route_policy_for_ingress(&ing, &ModuleSetModules::default())
                .unwrap(),
            None
        );
    }
}
