use async_trait::async_trait;
use aws_sdk_route53::types::HostedZone;
use tracing::{debug, info};

use super::*;
use crate::error::Error;

/// static for all of AWS when aliasing to a cloudfront distribution.
/// see https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// read-only reference to a hosted zone that already exists. never created or mutated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZoneRef {
    /// the bare id, without the `/hostedzone/` prefix.
    pub id: String,
    /// zone name without the trailing dot.
    pub name: String,
}

pub fn normalize_zone_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// strips `/hostedzone/` from ids as returned by the route53 API.
pub fn normalize_zone_id(id: &str) -> String {
    id.trim_start_matches("/hostedzone/").to_string()
}

/// finds a hosted zone by its domain name.
#[async_trait]
pub trait ZoneLookup: Send + Sync {
    async fn find_zone(&self, domain: &str) -> crate::Result<HostedZoneRef>;
}

pub struct Route53ZoneLookup {
    client: aws_sdk_route53::Client,
}

impl Route53ZoneLookup {
    pub fn new(client: aws_sdk_route53::Client) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Self {
        let shared_config = aws_config::from_env().load().await;
        Self::new(aws_sdk_route53::Client::new(&shared_config))
    }
}

#[async_trait]
impl ZoneLookup for Route53ZoneLookup {
    async fn find_zone(&self, domain: &str) -> crate::Result<HostedZoneRef> {
        let wanted = normalize_zone_name(domain);
        debug!(domain = %wanted, "looking up hosted zone");
        let resp = self.client
            .list_hosted_zones_by_name()
            .dns_name(format!("{wanted}."))
            .send()
            .await
            .map_err(|e| Error::Lookup {
                what: "hosted zone",
                name: wanted.clone(),
                message: format!("{:#?}", e),
            })?;
        match select_zone(resp.hosted_zones().unwrap_or_default(), &wanted) {
            Some(found) => {
                info!(zone_id = %found.id, zone = %found.name, "found hosted zone");
                Ok(found)
            }
            None => Err(Error::Lookup {
                what: "hosted zone",
                name: wanted,
                message: "no public hosted zone with this name exists in the account. hosted zones are not created by this tool".into(),
            }),
        }
    }
}

/// The public zone named exactly `wanted`.
///
/// `ListHostedZonesByName` returns zones in lexicographic order *starting* at the
/// requested name, so later entries can be unrelated zones. Private zones are skipped:
/// certificate validation records in them are invisible to the certificate authority.
pub fn select_zone(zones: &[HostedZone], wanted: &str) -> Option<HostedZoneRef> {
    let wanted = normalize_zone_name(wanted);
    zones.iter()
        .filter(|zone| !zone.config().map(|c| c.private_zone()).unwrap_or(false))
        .find(|zone| normalize_zone_name(zone.name().unwrap_or_default()) == wanted)
        .map(|zone| HostedZoneRef { id: normalize_zone_id(zone.id().unwrap_or_default()), name: wanted.clone() })
}

/// `A` alias record pointing a name at a distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route53AliasRecord {
    pub hosted_zone_id: String,
    pub record_name: String,
    pub distribution_logical_id: String,
}

impl CfnResource for Route53AliasRecord {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }

    fn properties(&self) -> Value {
        json!({
            "HostedZoneId": self.hosted_zone_id,
            "Name": self.record_name,
            "Type": "A",
            "AliasTarget": {
                "DNSName": get_att(&self.distribution_logical_id, "DomainName"),
                "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.record_name.is_empty() {
            return Err("Route53 record must have a name. Example mysubdomain.mywebsite.com".into());
        }
        if self.hosted_zone_id.is_empty() {
            return Err(format!("Route53 record {} is missing its hosted zone id", self.record_name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_route53::types::HostedZoneConfig;

    #[test]
    fn zone_names_and_ids_are_normalized() {
        assert_eq!(normalize_zone_name("Example.com."), "example.com");
        assert_eq!(normalize_zone_id("/hostedzone/Z123ABC"), "Z123ABC");
        assert_eq!(normalize_zone_id("Z123ABC"), "Z123ABC");
    }

    #[test]
    fn alias_record_targets_distribution_domain() {
        let record = Route53AliasRecord {
            hosted_zone_id: "Z123".into(),
            record_name: "www.example.com".into(),
            distribution_logical_id: "SiteDistribution".into(),
        };
        let props = record.properties();
        assert_eq!(props["Type"], "A");
        assert_eq!(props["AliasTarget"]["HostedZoneId"], CLOUDFRONT_HOSTED_ZONE_ID);
        assert_eq!(props["AliasTarget"]["DNSName"], get_att("SiteDistribution", "DomainName"));
        assert!(record.validate().is_ok());
    }

    fn zone(id: &str, name: &str, private: bool) -> HostedZone {
        HostedZone::builder()
            .id(format!("/hostedzone/{id}"))
            .name(name)
            .config(HostedZoneConfig::builder().private_zone(private).build())
            .build()
    }

    #[test]
    fn zone_must_match_exactly() {
        let zones = vec![zone("Z1", "example.com.", false), zone("Z2", "example.org.", false)];
        assert_eq!(select_zone(&zones, "example.org"), Some(HostedZoneRef { id: "Z2".into(), name: "example.org".into() }));
        assert_eq!(select_zone(&zones, "Example.COM"), Some(HostedZoneRef { id: "Z1".into(), name: "example.com".into() }));
        // listing starts at the requested name, so a following zone is not a match
        let zones = vec![zone("Z3", "sub.example.net.", false)];
        assert_eq!(select_zone(&zones, "example.net"), None);
    }

    #[test]
    fn private_zones_are_skipped() {
        let zones = vec![zone("ZPRIVATE", "example.com.", true), zone("ZPUBLIC", "example.com.", false)];
        assert_eq!(select_zone(&zones, "example.com").map(|z| z.id), Some("ZPUBLIC".to_string()));
        let only_private = vec![zone("ZPRIVATE", "example.com.", true)];
        assert_eq!(select_zone(&only_private, "example.com"), None);
    }

    #[test]
    fn alias_record_requires_a_name() {
        let record = Route53AliasRecord {
            hosted_zone_id: "Z123".into(),
            record_name: "".into(),
            distribution_logical_id: "SiteDistribution".into(),
        };
        assert!(record.validate().is_err());
    }
}
