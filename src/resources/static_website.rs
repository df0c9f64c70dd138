use tracing::debug;

use super::*;
use crate::error::{Error, Result};
use crate::graph::{DependencyKind, DeployStep, ResourceGraph, StackRole};
use crate::variables::{DeployEnv, SiteConfig, SiteMode};

pub const BUCKET_ID: &str = "SiteBucket";
pub const BUCKET_POLICY_ID: &str = "SiteBucketPolicy";
pub const CLEANUP_ROLE_ID: &str = "SiteBucketCleanupRole";
pub const CLEANUP_FUNCTION_ID: &str = "SiteBucketCleanupFunction";
pub const CLEANUP_TRIGGER_ID: &str = "SiteBucketCleanup";
pub const CERTIFICATE_ID: &str = "SiteCertificate";
pub const ORIGIN_ACCESS_CONTROL_ID: &str = "SiteOriginAccessControl";
pub const DISTRIBUTION_ID: &str = "SiteDistribution";
pub const DEPLOY_ASSETS_ID: &str = "DeployWebsite";
pub const INVALIDATE_ID: &str = "InvalidateCache";
/// template parameter carrying the certificate ARN across stacks.
pub const CERTIFICATE_ARN_PARAMETER: &str = "CertificateArn";

pub fn alias_record_id(record_name: &str) -> String {
    format!("AliasRecord{}", logical_suffix(record_name))
}

/// the names a site answers on: the apex domain and its `www` subdomain.
pub fn site_domain_names(domain: &str) -> Vec<String> {
    vec![domain.to_string(), format!("www.{domain}")]
}

/// The whole static website as one graph: bucket, optionally certificate + CDN + DNS,
/// and the post-deploy asset steps. Mode is taken from the config.
///
/// `zone` must be provided for CDN modes; it is looked up beforehand so this stays
/// free of provider calls.
pub fn compose_static_website(config: &SiteConfig, env: &DeployEnv, zone: Option<&HostedZoneRef>) -> Result<ResourceGraph> {
    config.validate()?;
    let mode = config.mode();
    debug!(?mode, bucket = %config.bucket_name, region = %env.region, "composing static website");
    let mut graph = ResourceGraph::new();

    let bucket = match mode {
        SiteMode::PublicBucket => S3Bucket::public_website(&config.bucket_name),
        SiteMode::DnsValidatedCdn | SiteMode::ImportedCertCdn => S3Bucket::cdn_origin(&config.bucket_name),
    };
    let auto_delete = bucket.auto_delete_objects;
    let bucket_node = graph.add_resource(BUCKET_ID, Resource::Bucket(bucket), StackRole::Main)?;
    if auto_delete {
        add_cleanup_resources(&mut graph, bucket_node)?;
    }
    let sync_node = graph.add_step(DEPLOY_ASSETS_ID, DeployStep::AssetSync { bucket_name: config.bucket_name.clone() })?;
    graph.depend(sync_node, bucket_node, DependencyKind::AssetDestination)?;

    if mode == SiteMode::PublicBucket {
        let policy = S3BucketPolicy { bucket_logical_id: BUCKET_ID.into(), grant: BucketGrant::PublicRead };
        let policy_node = graph.add_resource(BUCKET_POLICY_ID, Resource::BucketPolicy(policy), StackRole::Main)?;
        graph.depend(policy_node, bucket_node, DependencyKind::PolicyBucket)?;
        graph.check_invariants()?;
        return Ok(graph);
    }

    let site_domain = config.custom_domain.as_deref()
        .ok_or_else(|| Error::config(format!("mode {:?} requires customDomain to be set", mode)))?
        .to_ascii_lowercase();
    let domain = site_domain.as_str();
    let zone = zone.ok_or_else(|| Error::config(format!("mode {:?} requires the hosted zone for {domain}", mode)))?;
    let zone_name = normalize_zone_name(&zone.name);
    if domain != zone_name && !domain.ends_with(&format!(".{zone_name}")) {
        return Err(Error::config(format!("hosted zone {} cannot hold records for {domain}", zone.name)));
    }

    let (certificate, certificate_node) = match mode {
        SiteMode::DnsValidatedCdn => {
            let cert = AcmCertificate::for_site(domain, zone);
            // a stack can only create resources in its own region, so a certificate
            // for a stack outside us-east-1 goes into a companion stack.
            let (role, binding) = if env.region == CDN_CERTIFICATE_REGION {
                (StackRole::Main, CertificateBinding::Resource { logical_id: CERTIFICATE_ID.into() })
            } else {
                (StackRole::Certificate, CertificateBinding::Parameter { name: CERTIFICATE_ARN_PARAMETER.into() })
            };
            let node = graph.add_resource(CERTIFICATE_ID, Resource::Certificate(cert), role)?;
            (binding, Some(node))
        }
        _ => {
            let arn = config.certificate_arn.clone()
                .ok_or_else(|| Error::config("mode ImportedCertCdn requires certificateArn to be set"))?;
            (CertificateBinding::Imported { arn }, None)
        }
    };

    let mut oac_name = format!("{}-oac", config.bucket_name);
    oac_name.truncate(64);
    let oac = OriginAccessControl { name: oac_name };
    let oac_node = graph.add_resource(ORIGIN_ACCESS_CONTROL_ID, Resource::OriginAccessControl(oac), StackRole::Main)?;

    let mut distribution = CloudfrontDistribution::for_bucket(BUCKET_ID, ORIGIN_ACCESS_CONTROL_ID, certificate);
    distribution.aliases = site_domain_names(domain);
    distribution.comment = format!("static website {domain}");
    let distribution_node = graph.add_resource(DISTRIBUTION_ID, Resource::Distribution(distribution), StackRole::Main)?;
    graph.depend(distribution_node, bucket_node, DependencyKind::OriginBucket)?;
    graph.depend(distribution_node, oac_node, DependencyKind::OriginAccess)?;
    if let Some(cert_node) = certificate_node {
        graph.depend(distribution_node, cert_node, DependencyKind::ViewerCertificate)?;
    }

    let policy = S3BucketPolicy {
        bucket_logical_id: BUCKET_ID.into(),
        grant: BucketGrant::CloudfrontOrigin { distribution_logical_id: DISTRIBUTION_ID.into() },
    };
    let policy_node = graph.add_resource(BUCKET_POLICY_ID, Resource::BucketPolicy(policy), StackRole::Main)?;
    graph.depend(policy_node, bucket_node, DependencyKind::PolicyBucket)?;
    graph.depend(policy_node, distribution_node, DependencyKind::PolicyDistribution)?;

    for name in site_domain_names(domain) {
        let record = Route53AliasRecord {
            hosted_zone_id: zone.id.clone(),
            record_name: name.clone(),
            distribution_logical_id: DISTRIBUTION_ID.into(),
        };
        graph.upsert_alias_record(&alias_record_id(&name), record, StackRole::Main)?;
    }

    let invalidate_node = graph.add_step(INVALIDATE_ID, DeployStep::Invalidation { paths: vec!["/*".into()] })?;
    graph.depend(invalidate_node, sync_node, DependencyKind::AssetsUploaded)?;
    graph.depend(invalidate_node, distribution_node, DependencyKind::InvalidationTarget)?;

    graph.check_invariants()?;
    Ok(graph)
}

fn add_cleanup_resources(graph: &mut ResourceGraph, bucket_node: usize) -> Result<()> {
    let role = CleanupRole { bucket_logical_id: BUCKET_ID.into() };
    let role_node = graph.add_resource(CLEANUP_ROLE_ID, Resource::CleanupRole(role), StackRole::Main)?;
    graph.depend(role_node, bucket_node, DependencyKind::CleanupTarget)?;

    let function = CleanupFunction { role_logical_id: CLEANUP_ROLE_ID.into() };
    let function_node = graph.add_resource(CLEANUP_FUNCTION_ID, Resource::CleanupFunction(function), StackRole::Main)?;
    graph.depend(function_node, role_node, DependencyKind::CleanupRole)?;

    let trigger = CleanupTrigger { function_logical_id: CLEANUP_FUNCTION_ID.into(), bucket_logical_id: BUCKET_ID.into() };
    let trigger_node = graph.add_resource(CLEANUP_TRIGGER_ID, Resource::CleanupTrigger(trigger), StackRole::Main)?;
    graph.depend(trigger_node, function_node, DependencyKind::CleanupFunction)?;
    graph.depend(trigger_node, bucket_node, DependencyKind::CleanupTarget)?;
    Ok(())
}
