pub use serde_json::{json, Value};

mod s3_bucket;
pub use s3_bucket::*;
mod acm_cert;
pub use acm_cert::*;
mod cloudfront;
pub use cloudfront::*;
mod route53;
pub use route53::*;

// higher level resources:
mod static_website;
pub use static_website::*;

/// the region cloudfront requires viewer certificates to live in.
pub const CDN_CERTIFICATE_REGION: &str = "us-east-1";

/// something that can be rendered as one entry of a template's `Resources` section.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn sub(template: impl Into<String>) -> Value {
    json!({ "Fn::Sub": template.into() })
}

pub fn verify_resource_name(resource_name: &str) -> Option<String> {
    if resource_name.len() > 255 {
        return Some(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name));
    }
    if resource_name.is_empty() {
        return Some(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name));
    }
    None
}

/// turn an arbitrary name (bucket name, domain) into something usable in a logical id.
pub fn logical_suffix(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// what happens to a resource when its stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
}

impl RemovalPolicy {
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

/// every declaration the composition knows how to emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Bucket(S3Bucket),
    BucketPolicy(S3BucketPolicy),
    CleanupRole(CleanupRole),
    CleanupFunction(CleanupFunction),
    CleanupTrigger(CleanupTrigger),
    Certificate(AcmCertificate),
    OriginAccessControl(OriginAccessControl),
    Distribution(CloudfrontDistribution),
    AliasRecord(Route53AliasRecord),
}

impl Resource {
    fn inner(&self) -> &dyn CfnResource {
        match self {
            Resource::Bucket(r) => r,
            Resource::BucketPolicy(r) => r,
            Resource::CleanupRole(r) => r,
            Resource::CleanupFunction(r) => r,
            Resource::CleanupTrigger(r) => r,
            Resource::Certificate(r) => r,
            Resource::OriginAccessControl(r) => r,
            Resource::Distribution(r) => r,
            Resource::AliasRecord(r) => r,
        }
    }

    /// `DeletionPolicy` / `UpdateReplacePolicy` value, if the resource carries one.
    pub fn removal_policy(&self) -> Option<RemovalPolicy> {
        match self {
            Resource::Bucket(b) => Some(b.removal_policy),
            _ => None,
        }
    }
}

impl CfnResource for Resource {
    fn type_string(&self) -> &'static str {
        self.inner().type_string()
    }
    fn properties(&self) -> Value {
        self.inner().properties()
    }
    fn validate(&self) -> Result<(), String> {
        self.inner().validate()
    }
}
