use super::*;

/// caching optimized:
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
pub const DEFAULT_ORIGIN_ID: &str = "origin0";

/// https is always enforced; there is deliberately no allow-all variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewerProtocolPolicy {
    #[default]
    RedirectToHttps,
    HttpsOnly,
}

impl ViewerProtocolPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
            ViewerProtocolPolicy::HttpsOnly => "https-only",
        }
    }
}

/// only read-safe method sets are expressible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowedMethods {
    #[default]
    GetHead,
    GetHeadOptions,
}

impl AllowedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
        }
    }
}

/// where the distribution gets its viewer certificate ARN from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateBinding {
    /// certificate declared in the same stack.
    Resource { logical_id: String },
    /// certificate declared in a companion stack, passed in as a template parameter.
    Parameter { name: String },
    /// certificate that already exists in ACM.
    Imported { arn: String },
}

impl CertificateBinding {
    pub fn arn_value(&self) -> Value {
        match self {
            CertificateBinding::Resource { logical_id } => get_ref(logical_id),
            CertificateBinding::Parameter { name } => get_ref(name),
            CertificateBinding::Imported { arn } => json!(arn),
        }
    }
}

/// lets the distribution sign its requests to a private bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAccessControl {
    pub name: String,
}

impl CfnResource for OriginAccessControl {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::OriginAccessControl"
    }

    fn properties(&self) -> Value {
        json!({
            "OriginAccessControlConfig": {
                "Name": self.name,
                "OriginAccessControlOriginType": "s3",
                "SigningBehavior": "always",
                "SigningProtocol": "sigv4",
            }
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.len() > 64 {
            return Err(format!("Invalid origin access control name {:?}\nMust be between 1 and 64 characters", self.name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudfrontDistribution {
    pub comment: String,
    pub origin_bucket_logical_id: String,
    pub origin_access_control_logical_id: String,
    pub certificate: CertificateBinding,
    pub aliases: Vec<String>,
    pub default_root_object: String,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub allowed_methods: AllowedMethods,
    pub compress: bool,
    /// create the distribution disabled.
    pub disabled: bool,
}

impl CloudfrontDistribution {
    pub fn for_bucket(bucket_logical_id: &str, oac_logical_id: &str, certificate: CertificateBinding) -> Self {
        Self {
            comment: String::new(),
            origin_bucket_logical_id: bucket_logical_id.to_string(),
            origin_access_control_logical_id: oac_logical_id.to_string(),
            certificate,
            aliases: vec![],
            default_root_object: DEFAULT_INDEX_DOCUMENT.to_string(),
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            allowed_methods: AllowedMethods::GetHead,
            compress: true,
            disabled: false,
        }
    }
}

impl CfnResource for CloudfrontDistribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }

    fn properties(&self) -> Value {
        let methods = self.allowed_methods.methods();
        let mut config = json!({
            "Enabled": !self.disabled,
            "HttpVersion": "http2",
            "DefaultRootObject": self.default_root_object,
            "Origins": [{
                "Id": DEFAULT_ORIGIN_ID,
                "DomainName": get_att(&self.origin_bucket_logical_id, "RegionalDomainName"),
                // OAC replaces the legacy identity, which must be present but empty.
                "S3OriginConfig": { "OriginAccessIdentity": "" },
                "OriginAccessControlId": get_att(&self.origin_access_control_logical_id, "Id"),
            }],
            "DefaultCacheBehavior": {
                "TargetOriginId": DEFAULT_ORIGIN_ID,
                "ViewerProtocolPolicy": self.viewer_protocol_policy.as_str(),
                "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
                "AllowedMethods": methods,
                "CachedMethods": methods,
                "Compress": self.compress,
            },
            "ViewerCertificate": {
                "AcmCertificateArn": self.certificate.arn_value(),
                "MinimumProtocolVersion": "TLSv1.2_2021",
                "SslSupportMethod": "sni-only",
            },
        });
        if !self.aliases.is_empty() {
            config["Aliases"] = json!(self.aliases);
        }
        if !self.comment.is_empty() {
            config["Comment"] = json!(self.comment);
        }
        json!({ "DistributionConfig": config })
    }

    fn validate(&self) -> Result<(), String> {
        if self.origin_bucket_logical_id.is_empty() {
            return Err("cloudfront distribution origin bucket is required".into());
        }
        if self.aliases.is_empty() {
            return Err("cloudfront distribution with a viewer certificate must have at least one alias".into());
        }
        if let CertificateBinding::Imported { arn } = &self.certificate {
            if !arn.contains(&format!(":acm:{CDN_CERTIFICATE_REGION}:")) {
                return Err(format!("Certificate {arn} must be an ACM certificate in {CDN_CERTIFICATE_REGION}"));
            }
        }
        if self.comment.len() > 128 {
            return Err("cloudfront distribution comment must be at most 128 characters".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution() -> CloudfrontDistribution {
        let mut d = CloudfrontDistribution::for_bucket(
            "SiteBucket",
            "SiteOriginAccessControl",
            CertificateBinding::Resource { logical_id: "SiteCertificate".into() },
        );
        d.aliases = vec!["example.com".into(), "www.example.com".into()];
        d
    }

    #[test]
    fn defaults_are_https_redirect_and_compressed() {
        let d = distribution();
        let config = &d.properties()["DistributionConfig"];
        assert_eq!(config["DefaultRootObject"], "index.html");
        assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(config["DefaultCacheBehavior"]["Compress"], true);
        assert_eq!(config["DefaultCacheBehavior"]["AllowedMethods"], json!(["GET", "HEAD"]));
        assert_eq!(config["Aliases"], json!(["example.com", "www.example.com"]));
        assert_eq!(config["ViewerCertificate"]["AcmCertificateArn"], get_ref("SiteCertificate"));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn origin_uses_bucket_rest_endpoint_with_oac() {
        let d = distribution();
        let origin = &d.properties()["DistributionConfig"]["Origins"][0];
        assert_eq!(origin["DomainName"], get_att("SiteBucket", "RegionalDomainName"));
        assert_eq!(origin["OriginAccessControlId"], get_att("SiteOriginAccessControl", "Id"));
    }

    #[test]
    fn imported_certificate_must_be_in_cdn_region() {
        let mut d = distribution();
        d.certificate = CertificateBinding::Imported { arn: "arn:aws:acm:eu-west-1:123:certificate/abc".into() };
        assert!(d.validate().unwrap_err().contains("us-east-1"));

        d.certificate = CertificateBinding::Imported { arn: "arn:aws:acm:us-east-1:123:certificate/abc".into() };
        assert!(d.validate().is_ok());
        assert_eq!(d.properties()["DistributionConfig"]["ViewerCertificate"]["AcmCertificateArn"], "arn:aws:acm:us-east-1:123:certificate/abc");
    }

    #[test]
    fn parameter_binding_refs_the_parameter() {
        let binding = CertificateBinding::Parameter { name: "CertificateArn".into() };
        assert_eq!(binding.arn_value(), get_ref("CertificateArn"));
    }
}
