//! End to end flows behind each CLI command.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::deployment::{AssetDeployment, BucketStore, CacheInvalidator, CloudfrontInvalidator, S3BucketStore, SyncReport};
use crate::error::{Error, Result};
use crate::graph::{DeployStep, ResourceGraph, StackRole};
use crate::outputs::{DeploymentOutputs, DISTRIBUTION_ID_OUTPUT};
use crate::resources::{compose_static_website, HostedZoneRef, Route53ZoneLookup, ZoneLookup};
use crate::stack::{deploy_stacks, synthesize, SynthesizedStack};
use crate::variables::{DeployEnv, SiteConfig};

pub const DEFAULT_STACK_NAME: &str = "StaticSiteStack";
pub const DEFAULT_ASSETS_DIR: &str = "./src";

/// only CDN modes need a hosted zone.
pub async fn resolve_zone(config: &SiteConfig, lookup: &dyn ZoneLookup) -> Result<Option<HostedZoneRef>> {
    if !config.mode().uses_cdn() {
        return Ok(None);
    }
    let domain = config.custom_domain.as_deref()
        .ok_or_else(|| Error::config("a CDN deployment requires customDomain to be set"))?;
    Ok(Some(lookup.find_zone(domain).await?))
}

pub struct SitePlan {
    pub graph: ResourceGraph,
    pub stacks: Vec<SynthesizedStack>,
}

pub async fn plan_site(config: &SiteConfig, env: &DeployEnv, stack_name: &str, lookup: &dyn ZoneLookup) -> Result<SitePlan> {
    config.validate()?;
    info!(bucket = %config.bucket_name, mode = ?config.mode(), region = %env.region, "resolved configuration");
    let zone = resolve_zone(config, lookup).await?;
    let graph = compose_static_website(config, env, zone.as_ref())?;
    let stacks = synthesize(&graph, stack_name, env)?;
    Ok(SitePlan { graph, stacks })
}

/// write each template into `out_dir`, or print them all when there is none.
pub fn emit_templates(stacks: &[SynthesizedStack], out_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut written = vec![];
    for stack in stacks {
        match out_dir {
            Some(dir) => {
                let path = stack.write_to(dir)?;
                info!(stack = %stack.name, path = %path.display(), "wrote template");
                written.push(path);
            }
            None => println!("{}", stack.template_body()?),
        }
    }
    Ok(written)
}

pub fn collect_stack_outputs(deployed: &BTreeMap<StackRole, HashMap<String, String>>) -> DeploymentOutputs {
    let mut outputs = DeploymentOutputs::new();
    for values in deployed.values() {
        outputs.merge(values.clone());
    }
    outputs
}

/// Run the graph's deployment steps in dependency order against already provisioned stacks.
pub async fn run_deploy_steps(
    graph: &ResourceGraph,
    outputs: &DeploymentOutputs,
    assets_dir: &Path,
    dry_run: bool,
    store: &dyn BucketStore,
    invalidator: &dyn CacheInvalidator,
) -> Result<Option<SyncReport>> {
    let mut report: Option<SyncReport> = None;
    let mut deployment: Option<AssetDeployment> = None;
    for id in graph.topological_order()? {
        let node = graph.node(id);
        match node.step() {
            Some(DeployStep::AssetSync { bucket_name }) => {
                let d = AssetDeployment::new(assets_dir, bucket_name.clone()).dry_run(dry_run);
                report = Some(d.sync(store).await?);
                deployment = Some(d);
            }
            Some(DeployStep::Invalidation { paths }) => {
                let (d, r) = match (deployment.take(), report.as_mut()) {
                    (Some(d), Some(r)) => (d, r),
                    _ => return Err(Error::graph(format!("{} has no asset sync to follow", node.logical_id))),
                };
                let distribution_id = outputs.get(DISTRIBUTION_ID_OUTPUT).ok_or_else(|| Error::Lookup {
                    what: "stack output",
                    name: DISTRIBUTION_ID_OUTPUT.to_string(),
                    message: "the deployed stack did not report a distribution id".into(),
                })?;
                let d = d.with_distribution(distribution_id);
                d.invalidate(r, invalidator, paths).await?;
                deployment = Some(d);
            }
            None => {}
        }
    }
    Ok(report)
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub stack_name: String,
    pub assets_dir: PathBuf,
    pub dry_run_sync: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            dry_run_sync: false,
        }
    }
}

pub async fn deploy(config: &SiteConfig, env: &DeployEnv, options: &DeployOptions) -> Result<DeploymentOutputs> {
    let lookup = Route53ZoneLookup::from_env().await;
    let plan = plan_site(config, env, &options.stack_name, &lookup).await?;
    let deployed = deploy_stacks(&plan.stacks).await?;
    let mut outputs = collect_stack_outputs(&deployed);

    let store = S3BucketStore::for_region(&env.region).await;
    let invalidator = CloudfrontInvalidator::from_env().await;
    if let Some(report) = run_deploy_steps(&plan.graph, &outputs, &options.assets_dir, options.dry_run_sync, &store, &invalidator).await? {
        outputs.record_sync(&report);
    }
    Ok(outputs)
}

/// the deployment step alone, against an existing bucket.
pub async fn sync_only(deployment: &AssetDeployment, region: &str) -> Result<SyncReport> {
    let store = S3BucketStore::for_region(region).await;
    let invalidator = CloudfrontInvalidator::from_env().await;
    deployment.run(&store, &invalidator).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedZone(Option<HostedZoneRef>);

    #[async_trait]
    impl ZoneLookup for FixedZone {
        async fn find_zone(&self, domain: &str) -> Result<HostedZoneRef> {
            self.0.clone().ok_or_else(|| Error::Lookup {
                what: "hosted zone",
                name: domain.to_string(),
                message: "not found".into(),
            })
        }
    }

    #[tokio::test]
    async fn public_mode_never_looks_up_a_zone() {
        let zone = resolve_zone(&SiteConfig::new("example-site"), &FixedZone(None)).await.unwrap();
        assert!(zone.is_none());
    }

    #[tokio::test]
    async fn missing_zone_aborts_planning() {
        let config = SiteConfig::new("example-site").with_custom_domain("example.com");
        let err = plan_site(&config, &DeployEnv::default(), DEFAULT_STACK_NAME, &FixedZone(None)).await.err().unwrap();
        assert!(matches!(err, Error::Lookup { what: "hosted zone", .. }));
    }

    #[tokio::test]
    async fn planning_a_cdn_site_yields_one_stack_in_us_east_1() {
        let config = SiteConfig::new("example-site").with_custom_domain("example.com");
        let zone = HostedZoneRef { id: "Z1".into(), name: "example.com".into() };
        let plan = plan_site(&config, &DeployEnv::default(), DEFAULT_STACK_NAME, &FixedZone(Some(zone))).await.unwrap();
        assert_eq!(plan.stacks.len(), 1);
        assert_eq!(plan.stacks[0].name, DEFAULT_STACK_NAME);
    }

    #[test]
    fn stack_outputs_are_merged() {
        let mut deployed = BTreeMap::new();
        deployed.insert(StackRole::Certificate, HashMap::from([("CertificateArn".to_string(), "arn".to_string())]));
        deployed.insert(StackRole::Main, HashMap::from([("DistributionId".to_string(), "E1".to_string())]));
        let outputs = collect_stack_outputs(&deployed);
        assert_eq!(outputs.get("CertificateArn"), Some("arn"));
        assert_eq!(outputs.get(DISTRIBUTION_ID_OUTPUT), Some("E1"));
    }
}
