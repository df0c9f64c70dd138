use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const ACCOUNT_ENV_VAR: &str = "CDK_DEFAULT_ACCOUNT";
pub const REGION_ENV_VAR: &str = "CDK_DEFAULT_REGION";
pub const FALLBACK_REGION_ENV_VAR: &str = "AWS_REGION";
pub const DEFAULT_REGION: &str = "us-east-1";

pub const VALID_AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-north-1",
    "eu-west-3",
    "eu-west-2",
    "eu-west-1",
    "eu-central-1",
    "eu-south-1",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-east-1",
    "sa-east-1",
    "cn-north-1",
    "cn-northwest-1",
    "us-gov-east-1",
    "us-gov-west-1",
    "me-south-1",
    "af-south-1",
];

pub fn verify_region(r: &str) -> Option<String> {
    if !VALID_AWS_REGIONS.contains(&r) {
        Some(format!("Invalid region code {:?}\nMust be one of {:?}", r, VALID_AWS_REGIONS))
    } else {
        None
    }
}

/// which of the supported deployment topologies to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteMode {
    /// a single public-read bucket serving the website directly.
    PublicBucket,
    /// private bucket behind cloudfront, certificate issued + validated via DNS.
    DnsValidatedCdn,
    /// private bucket behind cloudfront, certificate already exists in ACM.
    ImportedCertCdn,
}

impl SiteMode {
    pub fn uses_cdn(&self) -> bool {
        !matches!(self, SiteMode::PublicBucket)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub bucket_name: String,
    #[serde(default)]
    pub custom_domain: Option<String>,
    /// only used by the imported certificate variant.
    #[serde(default)]
    pub certificate_arn: Option<String>,
    /// explicit override. when absent the mode is inferred from which keys are present.
    #[serde(default)]
    pub mode: Option<SiteMode>,
}

impl SiteConfig {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self { bucket_name: bucket_name.into(), ..Default::default() }
    }

    /// DNS names are case-insensitive; the domain is kept lowercase throughout.
    pub fn with_custom_domain(mut self, domain: impl Into<String>) -> Self {
        self.custom_domain = Some(domain.into().to_ascii_lowercase());
        self
    }

    pub fn with_certificate_arn(mut self, arn: impl Into<String>) -> Self {
        self.certificate_arn = Some(arn.into());
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, "read", e))?;
        let config = Self::from_json(&contents)?;
        debug!(path = %path.display(), bucket = %config.bucket_name, "loaded site configuration");
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let mut config: SiteConfig = serde_json::from_str(contents)
            .map_err(|e| Error::json("failed to parse site configuration", e))?;
        config.custom_domain = config.custom_domain.map(|d| d.to_ascii_lowercase());
        config.validate()?;
        Ok(config)
    }

    pub fn mode(&self) -> SiteMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        match (&self.custom_domain, &self.certificate_arn) {
            (None, _) => SiteMode::PublicBucket,
            (Some(_), Some(_)) => SiteMode::ImportedCertCdn,
            (Some(_), None) => SiteMode::DnsValidatedCdn,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(err) = verify_bucket_name(&self.bucket_name) {
            return Err(Error::config(err));
        }
        if let Some(domain) = &self.custom_domain {
            if let Some(err) = verify_domain_name(domain) {
                return Err(Error::config(err));
            }
        }
        let mode = self.mode();
        if mode.uses_cdn() && self.custom_domain.is_none() {
            return Err(Error::config(format!("mode {:?} requires customDomain to be set", mode)));
        }
        if mode == SiteMode::ImportedCertCdn {
            match &self.certificate_arn {
                Some(arn) if arn.starts_with("arn:") => {}
                Some(arn) => {
                    return Err(Error::config(format!("Invalid certificateArn {:?}\nMust be an ARN, eg: arn:aws:acm:us-east-1:...", arn)));
                }
                None => {
                    return Err(Error::config("mode ImportedCertCdn requires certificateArn to be set"));
                }
            }
        }
        Ok(())
    }
}

pub fn verify_bucket_name(bucket_name: &str) -> Option<String> {
    if bucket_name.len() > 63 || bucket_name.len() < 3 {
        return Some(format!("Invalid bucket name {:?}\nMust be between 3 and 63 characters", bucket_name));
    }
    let valid_char_check = |c: char| -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
    };
    if !bucket_name.chars().all(valid_char_check) {
        return Some(format!("Invalid bucket name {:?}\nMay only contain lowercase letters, numbers, dots, and dashes", bucket_name));
    }
    let first_ok = bucket_name.chars().next().map_or(false, |c| c.is_ascii_alphanumeric());
    let last_ok = bucket_name.chars().last().map_or(false, |c| c.is_ascii_alphanumeric());
    if !first_ok || !last_ok {
        return Some(format!("Invalid bucket name {:?}\nFirst and last character must be either lowercase letter, or number", bucket_name));
    }
    if bucket_name.contains("..") {
        return Some(format!("Invalid bucket name {:?}\nMay not contain two consecutive dots", bucket_name));
    }
    None
}

/// a fully qualified, non wildcard domain. eg: `example.com` or `sub.example.com`.
pub fn verify_domain_name(domain: &str) -> Option<String> {
    if domain.is_empty() || domain.len() > 253 {
        return Some(format!("Invalid domain {:?}\nMust be between 1 and 253 characters", domain));
    }
    if domain.ends_with('.') {
        return Some(format!("Invalid domain {:?}\ncannot end with a dot", domain));
    }
    if domain.contains('*') {
        return Some(format!("Invalid domain {:?}\nMust not contain a wildcard", domain));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Some(format!("Invalid domain {:?}\nMust contain at least one dot, eg: example.com", domain));
    }
    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Some(format!("Invalid domain {:?}\nlabel {:?} is not a valid DNS label", domain, label));
        }
    }
    None
}

/// account + region the stacks are deployed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployEnv {
    pub account: Option<String>,
    pub region: String,
}

impl Default for DeployEnv {
    fn default() -> Self {
        Self { account: None, region: DEFAULT_REGION.to_string() }
    }
}

impl DeployEnv {
    pub fn new(region: impl Into<String>) -> Result<Self> {
        let region = region.into();
        if let Some(err) = verify_region(&region) {
            return Err(Error::config(err));
        }
        Ok(Self { account: None, region })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// resolve using an arbitrary variable source. empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let region = get(REGION_ENV_VAR)
            .or_else(|| get(FALLBACK_REGION_ENV_VAR))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut env = Self::new(region)?;
        env.account = get(ACCOUNT_ENV_VAR);
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_inferred_from_present_keys() {
        let public = SiteConfig::new("example-site");
        assert_eq!(public.mode(), SiteMode::PublicBucket);

        let dns = SiteConfig::new("example-site").with_custom_domain("example.com");
        assert_eq!(dns.mode(), SiteMode::DnsValidatedCdn);

        let imported = dns.clone().with_certificate_arn("arn:aws:acm:us-east-1:123:certificate/abc");
        assert_eq!(imported.mode(), SiteMode::ImportedCertCdn);
    }

    #[test]
    fn parses_camel_case_json() {
        let config = SiteConfig::from_json(r#"{"bucketName": "example-site", "customDomain": "example.com"}"#).unwrap();
        assert_eq!(config.bucket_name, "example-site");
        assert_eq!(config.custom_domain.as_deref(), Some("example.com"));

        let config = SiteConfig::from_json(r#"{"bucketName": "example-site", "customDomain": "example.com", "mode": "public-bucket"}"#).unwrap();
        assert_eq!(config.mode(), SiteMode::PublicBucket);
    }

    #[test]
    fn custom_domain_is_lowercased() {
        let config = SiteConfig::from_json(r#"{"bucketName": "example-site", "customDomain": "Example.COM"}"#).unwrap();
        assert_eq!(config.custom_domain.as_deref(), Some("example.com"));
        let config = SiteConfig::new("example-site").with_custom_domain("WWW.Example.com");
        assert_eq!(config.custom_domain.as_deref(), Some("www.example.com"));
    }

    #[test]
    fn missing_bucket_name_is_a_config_error() {
        let err = SiteConfig::from_json(r#"{"customDomain": "example.com"}"#).unwrap_err();
        assert!(matches!(err, Error::Json { .. }));
    }

    #[test]
    fn cdn_mode_without_domain_fails() {
        let config = SiteConfig {
            bucket_name: "example-site".into(),
            mode: Some(SiteMode::DnsValidatedCdn),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requires customDomain"));
    }

    #[test]
    fn bucket_name_rules() {
        assert!(verify_bucket_name("example-site").is_none());
        assert!(verify_bucket_name("ab").unwrap().contains("between 3 and 63"));
        assert!(verify_bucket_name("Example").unwrap().contains("lowercase"));
        assert!(verify_bucket_name("-example").unwrap().contains("First and last"));
        assert!(verify_bucket_name("some..thing").unwrap().contains("two consecutive dots"));
    }

    #[test]
    fn domain_rules() {
        assert!(verify_domain_name("example.com").is_none());
        assert!(verify_domain_name("multiple.sub.example.com").is_none());
        assert!(verify_domain_name("*.example.com").is_some());
        assert!(verify_domain_name("example.com.").is_some());
        assert!(verify_domain_name("localhost").is_some());
        assert!(verify_domain_name("bad_label.com").is_some());
    }

    #[test]
    fn deploy_env_prefers_cdk_variables() {
        let env = DeployEnv::from_lookup(|k| match k {
            REGION_ENV_VAR => Some("eu-west-1".into()),
            FALLBACK_REGION_ENV_VAR => Some("us-west-2".into()),
            ACCOUNT_ENV_VAR => Some("123456789012".into()),
            _ => None,
        }).unwrap();
        assert_eq!(env.region, "eu-west-1");
        assert_eq!(env.account.as_deref(), Some("123456789012"));

        let env = DeployEnv::from_lookup(|_| None).unwrap();
        assert_eq!(env.region, DEFAULT_REGION);
        assert_eq!(env.account, None);

        let err = DeployEnv::from_lookup(|k| (k == REGION_ENV_VAR).then(|| "mars-1".to_string())).unwrap_err();
        assert!(err.to_string().contains("Invalid region code"));
    }
}
