use super::*;

/// an ACM certificate for a domain hosted in Route 53, validated with DNS records
/// that cloudformation inserts into the hosted zone.
/// validation is paced by the certificate authority; the stack waits on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmCertificate {
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    pub hosted_zone_id: String,
    /// always `us-east-1` for certificates bound to a distribution.
    pub region: String,
}

impl AcmCertificate {
    /// covers the apex domain and every direct subdomain.
    pub fn for_site(domain: &str, zone: &HostedZoneRef) -> Self {
        Self {
            domain_name: domain.to_string(),
            subject_alternative_names: vec![domain.to_string(), format!("*.{domain}")],
            hosted_zone_id: zone.id.clone(),
            region: CDN_CERTIFICATE_REGION.to_string(),
        }
    }

    fn all_names(&self) -> Vec<&str> {
        let mut names = vec![self.domain_name.as_str()];
        for san in &self.subject_alternative_names {
            if !names.contains(&san.as_str()) {
                names.push(san);
            }
        }
        names
    }
}

fn verify_certificate_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("Must provide a domain name".to_string());
    }
    if name.ends_with('.') {
        return Some(format!("{} is invalid. Certificate names cannot end with a dot", name));
    }
    if name.contains('*') {
        if name.matches('*').count() > 1 {
            return Some(format!("Must only provide 1 wildcard. {} is invalid.", name));
        }
        if !name.starts_with("*.") {
            return Some(format!("If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\". {} is invalid.", name));
        }
    }
    None
}

impl CfnResource for AcmCertificate {
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }

    fn properties(&self) -> Value {
        // the wildcard name validates with the same record as the apex,
        // but every name still needs its own validation option.
        let validation_options: Vec<Value> = self.all_names().into_iter().map(|name| json!({
            "DomainName": name,
            "HostedZoneId": self.hosted_zone_id,
        })).collect();
        json!({
            "DomainName": self.domain_name,
            "SubjectAlternativeNames": self.subject_alternative_names,
            "ValidationMethod": "DNS",
            "DomainValidationOptions": validation_options,
        })
    }

    fn validate(&self) -> Result<(), String> {
        for name in self.all_names() {
            if let Some(err) = verify_certificate_name(name) {
                return Err(err);
            }
        }
        if self.hosted_zone_id.is_empty() {
            return Err("Must provide the hosted zone ID of where your domain resides".to_string());
        }
        if self.region != CDN_CERTIFICATE_REGION {
            return Err(format!(
                "Certificate for {} must be issued in {} to be usable by cloudfront, not {}",
                self.domain_name, CDN_CERTIFICATE_REGION, self.region
            ));
        }
        Ok(())
    }
}
