//! HTTPRoute filter compiler
//!
//! Translates the ordered filters of one HTTPRoute rule into a traffic policy
//! document. Header, rewrite and redirect filters accumulate actions for the
//! request or response phase. An `ExtensionRef` to a TrafficPolicy first
//! flushes the pending actions into numbered rules
//! (`Inbound HTTPRouteRule 1`, `Outbound HTTPRouteRule 1`, ...) and then
//! appends the referenced policy's rules, so relative order survives across
//! phases.
//!
//! Unsupported constructs (request mirroring, regex path matches, method,
//! header and query parameter matches) fail the whole rule.

use crate::error::{Error, Result};
use crate::store::Store;
use common::crd::TrafficPolicyResource;
use common::policy::{PHASE_ON_HTTP_REQUEST, PHASE_ON_HTTP_RESPONSE};
use common::{Action, Rule, TrafficPolicy};
use gateway_api::apis::standard::httproutes::{
    HTTPRouteRules, HTTPRouteRulesFilters, HTTPRouteRulesFiltersExtensionRef,
    HTTPRouteRulesFiltersRequestRedirect, HTTPRouteRulesFiltersRequestRedirectPath,
    HTTPRouteRulesFiltersRequestRedirectPathType, HTTPRouteRulesFiltersRequestRedirectScheme,
    HTTPRouteRulesFiltersType, HTTPRouteRulesFiltersUrlRewrite, HTTPRouteRulesFiltersUrlRewritePath,
    HTTPRouteRulesFiltersUrlRewritePathType, HTTPRouteRulesMatches, HTTPRouteRulesMatchesPathType,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const ACTION_ADD_HEADERS: &str = "add-headers";
pub const ACTION_REMOVE_HEADERS: &str = "remove-headers";
pub const ACTION_URL_REWRITE: &str = "url-rewrite";
pub const ACTION_REDIRECT: &str = "redirect";

const EXTENSION_KIND_TRAFFIC_POLICY: &str = "TrafficPolicy";

/// Matches any URL; used for full-path replacement
const MATCH_ANY: &str = ".*";

#[derive(Serialize)]
struct RewriteConfig<'a> {
    from: &'a str,
    to: &'a str,
}

#[derive(Serialize)]
struct RedirectConfig<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: &'a BTreeMap<String, String>,
}

/// URL regex capturing the port as `$1`, the prefix as `$2`, the rest of the
/// path as `$3` and the query as `$4`
pub fn prefix_regex(prefix: &str) -> String {
    format!(
        r"^https?://[^/:]+(:[0-9]*)?({})([^\?]*)(\?.*)?$",
        regex::escape(prefix)
    )
}

/// Compile a rule's filters; `None` when no actions result
pub fn compile_route_policy(
    store: &Store,
    rule: &HTTPRouteRules,
    namespace: &str,
) -> Result<Option<Value>> {
    let prefixes = path_prefix_matches(rule)?;
    let mut compiler = FilterCompiler::new(store, namespace, prefixes);
    for filter in rule.filters.iter().flatten() {
        compiler.apply(filter)?;
    }
    compiler.finish()
}

/// Path prefixes the rule matches on; rewrites and redirects are built
/// against these
fn path_prefix_matches(rule: &HTTPRouteRules) -> Result<Vec<String>> {
    let mut prefixes = Vec::new();
    for m in rule.matches.iter().flatten() {
        reject_non_path_matches(m)?;

        let Some(path) = &m.path else {
            continue;
        };
        match &path.r#type {
            None | Some(HTTPRouteRulesMatchesPathType::Exact) => {}
            Some(HTTPRouteRulesMatchesPathType::PathPrefix) => prefixes.extend(path.value.clone()),
            Some(HTTPRouteRulesMatchesPathType::RegularExpression) => {
                return Err(Error::Unsupported(
                    "path match type RegularExpression is not supported".to_string(),
                ))
            }
        }
    }
    Ok(prefixes)
}

/// Only path matches can be expressed on an edge route
fn reject_non_path_matches(m: &HTTPRouteRulesMatches) -> Result<()> {
    if let Some(method) = &m.method {
        return Err(Error::Unsupported(format!(
            "match type HTTPMethod {:?} is not supported",
            method
        )));
    }
    if let Some(headers) = m.headers.as_ref().filter(|h| !h.is_empty()) {
        let names: Vec<&str> = headers.iter().map(|h| h.name.as_str()).collect();
        return Err(Error::Unsupported(format!(
            "match type HTTPHeaderMatch {:?} is not supported",
            names
        )));
    }
    if let Some(params) = m.query_params.as_ref().filter(|q| !q.is_empty()) {
        let names: Vec<&str> = params.iter().map(|q| q.name.as_str()).collect();
        return Err(Error::Unsupported(format!(
            "match type HTTPQueryParamMatch {:?} is not supported",
            names
        )));
    }
    Ok(())
}

/// Header modifier fields flattened to name/value pairs. Request and
/// response modifiers are distinct types with the same shape.
macro_rules! header_changes {
    ($modifier:expr) => {
        HeaderChanges {
            remove: $modifier.remove.clone().unwrap_or_default(),
            add: $modifier
                .add
                .iter()
                .flatten()
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect(),
            set: $modifier
                .set
                .iter()
                .flatten()
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect(),
        }
    };
}

struct HeaderChanges {
    remove: Vec<String>,
    add: Vec<(String, String)>,
    set: Vec<(String, String)>,
}

/// Path rewrite shared by redirects and URL rewrites
enum PathModifier {
    FullPath(String),
    PrefixMatch(String),
}

impl From<&HTTPRouteRulesFiltersUrlRewritePath> for PathModifier {
    fn from(path: &HTTPRouteRulesFiltersUrlRewritePath) -> Self {
        match path.r#type {
            HTTPRouteRulesFiltersUrlRewritePathType::ReplaceFullPath => {
                Self::FullPath(path.replace_full_path.clone().unwrap_or_default())
            }
            HTTPRouteRulesFiltersUrlRewritePathType::ReplacePrefixMatch => {
                Self::PrefixMatch(path.replace_prefix_match.clone().unwrap_or_default())
            }
        }
    }
}

impl From<&HTTPRouteRulesFiltersRequestRedirectPath> for PathModifier {
    fn from(path: &HTTPRouteRulesFiltersRequestRedirectPath) -> Self {
        match path.r#type {
            HTTPRouteRulesFiltersRequestRedirectPathType::ReplaceFullPath => {
                Self::FullPath(path.replace_full_path.clone().unwrap_or_default())
            }
            HTTPRouteRulesFiltersRequestRedirectPathType::ReplacePrefixMatch => {
                Self::PrefixMatch(path.replace_prefix_match.clone().unwrap_or_default())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Request,
    Response,
}

struct FilterCompiler<'a> {
    store: &'a Store,
    namespace: &'a str,
    path_prefixes: Vec<String>,
    policy: TrafficPolicy,
    request_actions: Vec<Action>,
    response_actions: Vec<Action>,
    /// Response header values attached to later redirects
    response_headers: BTreeMap<String, String>,
    flush_count: usize,
}

impl<'a> FilterCompiler<'a> {
    fn new(store: &'a Store, namespace: &'a str, path_prefixes: Vec<String>) -> Self {
        Self {
            store,
            namespace,
            path_prefixes,
            policy: TrafficPolicy::new(),
            request_actions: Vec::new(),
            response_actions: Vec::new(),
            response_headers: BTreeMap::new(),
            flush_count: 0,
        }
    }

    fn actions(&mut self, phase: Phase) -> &mut Vec<Action> {
        match phase {
            Phase::Request => &mut self.request_actions,
            Phase::Response => &mut self.response_actions,
        }
    }

    fn apply(&mut self, filter: &HTTPRouteRulesFilters) -> Result<()> {
        match &filter.r#type {
            HTTPRouteRulesFiltersType::RequestRedirect => {
                if let Some(redirect) = &filter.request_redirect {
                    self.request_redirect(redirect)?;
                }
            }
            HTTPRouteRulesFiltersType::RequestHeaderModifier => {
                if let Some(modifier) = &filter.request_header_modifier {
                    self.header_modifier(header_changes!(modifier), Phase::Request);
                }
            }
            HTTPRouteRulesFiltersType::ResponseHeaderModifier => {
                if let Some(modifier) = &filter.response_header_modifier {
                    self.header_modifier(header_changes!(modifier), Phase::Response);
                }
            }
            HTTPRouteRulesFiltersType::UrlRewrite => {
                if let Some(rewrite) = &filter.url_rewrite {
                    self.url_rewrite(rewrite)?;
                }
            }
            HTTPRouteRulesFiltersType::RequestMirror => {
                return Err(Error::Unsupported(
                    "filter type RequestMirror is not supported".to_string(),
                ))
            }
            HTTPRouteRulesFiltersType::ExtensionRef => {
                self.flush();
                if let Some(reference) = &filter.extension_ref {
                    self.extension_ref(reference)?;
                }
            }
        }
        Ok(())
    }

    /// Move pending actions into numbered rules
    fn flush(&mut self) {
        if self.request_actions.is_empty() && self.response_actions.is_empty() {
            return;
        }
        self.flush_count += 1;

        if !self.request_actions.is_empty() {
            let actions = std::mem::take(&mut self.request_actions);
            self.policy.merge_rule(
                Rule::new(format!("Inbound HTTPRouteRule {}", self.flush_count), actions),
                PHASE_ON_HTTP_REQUEST,
            );
        }
        if !self.response_actions.is_empty() {
            let actions = std::mem::take(&mut self.response_actions);
            self.policy.merge_rule(
                Rule::new(format!("Outbound HTTPRouteRule {}", self.flush_count), actions),
                PHASE_ON_HTTP_RESPONSE,
            );
        }
    }

    fn finish(mut self) -> Result<Option<Value>> {
        self.flush();
        if self.policy.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.policy.to_value()?))
    }

    // ------------------------------------------------------------------------
    // Header modifiers
    // ------------------------------------------------------------------------

    /// `remove`, then `add`, then `set` (as remove followed by add)
    fn header_modifier(&mut self, changes: HeaderChanges, phase: Phase) {
        self.remove_headers(&changes.remove, phase);
        self.add_headers(&changes.add, phase);

        let set_names: Vec<String> = changes.set.iter().map(|(name, _)| name.clone()).collect();
        self.remove_headers(&set_names, phase);
        self.add_headers(&changes.set, phase);
    }

    fn remove_headers(&mut self, names: &[String], phase: Phase) {
        if names.is_empty() {
            return;
        }
        self.actions(phase)
            .push(Action::new(ACTION_REMOVE_HEADERS, json!({ "headers": names })));
    }

    fn add_headers(&mut self, headers: &[(String, String)], phase: Phase) {
        if headers.is_empty() {
            return;
        }
        let values: BTreeMap<String, String> = headers.iter().cloned().collect();
        if phase == Phase::Response {
            self.response_headers.extend(values.clone());
        }
        self.actions(phase)
            .push(Action::new(ACTION_ADD_HEADERS, json!({ "headers": values })));
    }

    // ------------------------------------------------------------------------
    // Rewrites and redirects
    // ------------------------------------------------------------------------

    fn url_rewrite(&mut self, filter: &HTTPRouteRulesFiltersUrlRewrite) -> Result<()> {
        if let Some(hostname) = &filter.hostname {
            self.add_headers(&[("Host".to_string(), hostname.clone())], Phase::Request);
        }

        let Some(path) = &filter.path else {
            return Ok(());
        };

        match PathModifier::from(path) {
            PathModifier::PrefixMatch(replacement) => {
                for prefix in self.path_prefixes.clone() {
                    let to = format!("$scheme://$authority{}$3$is_args$args", replacement);
                    self.rewrite(&prefix_regex(&prefix), &to)?;
                }
            }
            PathModifier::FullPath(full) => {
                let to = format!("$scheme://$authority{}$is_args$args", full);
                self.rewrite(MATCH_ANY, &to)?;
            }
        }
        Ok(())
    }

    fn rewrite(&mut self, from: &str, to: &str) -> Result<()> {
        let config = serde_json::to_value(RewriteConfig { from, to })?;
        self.request_actions
            .push(Action::new(ACTION_URL_REWRITE, config));
        Ok(())
    }

    fn request_redirect(&mut self, filter: &HTTPRouteRulesFiltersRequestRedirect) -> Result<()> {
        let scheme = match &filter.scheme {
            Some(HTTPRouteRulesFiltersRequestRedirectScheme::Http) => "http",
            Some(HTTPRouteRulesFiltersRequestRedirectScheme::Https) => "https",
            None => "$scheme",
        };
        let host = filter.hostname.as_deref().unwrap_or("$host");
        let port = filter
            .port
            .map(|p| format!(":{}", p))
            .unwrap_or_else(|| "$1".to_string());
        let status_code = filter.status_code.map(i64::from);

        let Some(path) = &filter.path else {
            let to = format!("{}://{}{}$uri", scheme, host, port);
            return self.redirect(MATCH_ANY, &to, status_code);
        };

        match PathModifier::from(path) {
            PathModifier::PrefixMatch(replacement) => {
                for prefix in self.path_prefixes.clone() {
                    let to = format!(
                        "{}://{}{}{}$3$is_args$args",
                        scheme, host, port, replacement
                    );
                    self.redirect(&prefix_regex(&prefix), &to, status_code)?;
                }
            }
            PathModifier::FullPath(full) => {
                let to = format!("{}://{}{}{}$is_args$args", scheme, host, port, full);
                self.redirect(MATCH_ANY, &to, status_code)?;
            }
        }
        Ok(())
    }

    fn redirect(&mut self, from: &str, to: &str, status_code: Option<i64>) -> Result<()> {
        let config = serde_json::to_value(RedirectConfig {
            from,
            to,
            status_code,
            headers: &self.response_headers,
        })?;
        self.request_actions.push(Action::new(ACTION_REDIRECT, config));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Extension references
    // ------------------------------------------------------------------------

    fn extension_ref(&mut self, reference: &HTTPRouteRulesFiltersExtensionRef) -> Result<()> {
        if reference.kind != EXTENSION_KIND_TRAFFIC_POLICY {
            return Err(Error::Unsupported(format!(
                "unknown ExtensionRef kind {} (name {})",
                reference.kind, reference.name
            )));
        }

        let resource = self
            .store
            .get::<TrafficPolicyResource>(self.namespace, &reference.name)?;
        let document = resource.spec.policy.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "TrafficPolicy {}/{} has no policy",
                self.namespace, reference.name
            ))
        })?;

        let mut referenced = TrafficPolicy::from_value(document)?;
        if referenced.is_legacy() {
            referenced.convert_legacy_directions_to_phases();
        }
        self.policy.merge(referenced);
        Ok(())
    }
}
