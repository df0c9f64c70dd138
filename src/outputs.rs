//! Operator facing identifiers: declared as template outputs, collected after the
//! stacks settle, and printed. Nothing here touches infrastructure.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::json;
use tracing::info;

use crate::deployment::SyncReport;
use crate::graph::{ResourceGraph, StackRole};
use crate::resources::*;
use crate::stack::template::ResourceOutput;

pub const BUCKET_NAME_OUTPUT: &str = "BucketName";
pub const BUCKET_WEBSITE_URL_OUTPUT: &str = "BucketWebsiteURL";
pub const DISTRIBUTION_ID_OUTPUT: &str = "DistributionId";
pub const DISTRIBUTION_DOMAIN_OUTPUT: &str = "DistributionDomainName";
pub const CERTIFICATE_ARN_OUTPUT: &str = "CertificateArn";
pub const CUSTOM_DOMAIN_URL_OUTPUT: &str = "CustomDomainURL";
pub const ASSETS_UPLOADED_OUTPUT: &str = "AssetsUploaded";
pub const ASSETS_DELETED_OUTPUT: &str = "AssetsDeleted";
pub const INVALIDATION_ID_OUTPUT: &str = "InvalidationId";

#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredOutput {
    pub stack: StackRole,
    pub key: &'static str,
    pub output: ResourceOutput,
}

fn declared(stack: StackRole, key: &'static str, description: &str, value: Value) -> DeclaredOutput {
    DeclaredOutput { stack, key, output: ResourceOutput { description: description.to_string(), value } }
}

/// the outputs each stack's template should carry, derived from what the graph declares.
pub fn template_outputs(graph: &ResourceGraph) -> Vec<DeclaredOutput> {
    let mut out = vec![];
    for (node, bucket) in graph.buckets() {
        out.push(declared(node.stack, BUCKET_NAME_OUTPUT, "Name of the bucket holding the website", get_ref(&node.logical_id)));
        if bucket.website.is_some() {
            out.push(declared(
                node.stack,
                BUCKET_WEBSITE_URL_OUTPUT,
                "URL for the static website hosted in S3",
                get_att(&node.logical_id, "WebsiteURL"),
            ));
        }
    }
    for (node, _) in graph.certificates() {
        out.push(declared(node.stack, CERTIFICATE_ARN_OUTPUT, "ARN of the site certificate", get_ref(&node.logical_id)));
    }
    for (node, distribution) in graph.distributions() {
        out.push(declared(node.stack, DISTRIBUTION_ID_OUTPUT, "ID of the cloudfront distribution", get_ref(&node.logical_id)));
        out.push(declared(
            node.stack,
            DISTRIBUTION_DOMAIN_OUTPUT,
            "Domain name of the cloudfront distribution",
            get_att(&node.logical_id, "DomainName"),
        ));
        if let CertificateBinding::Imported { arn } = &distribution.certificate {
            out.push(declared(node.stack, CERTIFICATE_ARN_OUTPUT, "ARN of the site certificate", json!(arn)));
        }
        if let Some(domain) = distribution.aliases.first() {
            out.push(declared(node.stack, CUSTOM_DOMAIN_URL_OUTPUT, "URL of the website on its custom domain", json!(format!("https://{domain}"))));
        }
    }
    out
}

/// resolved output values from every deployed stack, plus anything the asset step reports.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeploymentOutputs {
    values: BTreeMap<String, String>,
}

impl DeploymentOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, values: impl IntoIterator<Item = (String, String)>) {
        self.values.extend(values);
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn record_sync(&mut self, report: &SyncReport) {
        self.insert(ASSETS_UPLOADED_OUTPUT, report.uploaded.to_string());
        self.insert(ASSETS_DELETED_OUTPUT, report.deleted.to_string());
        if let Some(id) = &report.invalidation_id {
            self.insert(INVALIDATION_ID_OUTPUT, id.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `key = value` lines, sorted by key.
    pub fn render(&self) -> String {
        let width = self.values.keys().map(|k| k.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (key, value) in &self.values {
            let _ = writeln!(out, "{key:width$} = {value}");
        }
        out
    }

    pub fn emit(&self) {
        for (key, value) in &self.values {
            info!(output = %key, %value, "stack output");
        }
        print!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StackRole;
    use crate::variables::{DeployEnv, SiteConfig};

    #[test]
    fn public_site_outputs_website_url() {
        let graph = compose_static_website(&SiteConfig::new("example-site"), &DeployEnv::default(), None).unwrap();
        let keys: Vec<&str> = template_outputs(&graph).iter().map(|o| o.key).collect();
        assert_eq!(keys, vec![BUCKET_NAME_OUTPUT, BUCKET_WEBSITE_URL_OUTPUT]);
    }

    #[test]
    fn cdn_site_outputs_land_in_their_stacks() {
        let config = SiteConfig::new("example-site").with_custom_domain("example.com");
        let zone = HostedZoneRef { id: "Z1".into(), name: "example.com".into() };
        let env = DeployEnv::new("eu-west-1").unwrap();
        let graph = compose_static_website(&config, &env, Some(&zone)).unwrap();
        let outputs = template_outputs(&graph);
        let cert = outputs.iter().find(|o| o.key == CERTIFICATE_ARN_OUTPUT).unwrap();
        assert_eq!(cert.stack, StackRole::Certificate);
        let url = outputs.iter().find(|o| o.key == CUSTOM_DOMAIN_URL_OUTPUT).unwrap();
        assert_eq!(url.output.value, "https://example.com");
        assert!(outputs.iter().all(|o| o.key != BUCKET_WEBSITE_URL_OUTPUT));
    }

    #[test]
    fn render_is_sorted_and_aligned() {
        let mut outputs = DeploymentOutputs::new();
        outputs.insert("DistributionId", "E123");
        outputs.insert("BucketName", "example-site");
        assert_eq!(outputs.render(), "BucketName     = example-site\nDistributionId = E123\n");
    }

    #[test]
    fn sync_report_is_recorded() {
        let mut outputs = DeploymentOutputs::new();
        let report = SyncReport { uploaded: 3, deleted: 1, invalidation_id: Some("I9".into()), ..Default::default() };
        outputs.record_sync(&report);
        assert_eq!(outputs.get(ASSETS_UPLOADED_OUTPUT), Some("3"));
        assert_eq!(outputs.get(ASSETS_DELETED_OUTPUT), Some("1"));
        assert_eq!(outputs.get(INVALIDATION_ID_OUTPUT), Some("I9"));
    }
}
