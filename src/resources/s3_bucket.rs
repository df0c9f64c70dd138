use super::*;
use crate::variables::verify_bucket_name;

pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteHosting {
    pub index_document: String,
    pub error_document: Option<String>,
}

impl Default for WebsiteHosting {
    fn default() -> Self {
        Self { index_document: DEFAULT_INDEX_DOCUMENT.into(), error_document: None }
    }
}

/// mirrors the two public access block presets a static site needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPublicAccess {
    /// ACLs are blocked/ignored but a public bucket policy is still allowed.
    BlockAcls,
    BlockAll,
}

impl BlockPublicAccess {
    fn configuration(&self) -> Value {
        let policies_blocked = matches!(self, BlockPublicAccess::BlockAll);
        json!({
            "BlockPublicAcls": true,
            "IgnorePublicAcls": true,
            "BlockPublicPolicy": policies_blocked,
            "RestrictPublicBuckets": policies_blocked,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct S3Bucket {
    /// physical bucket name. must be globally unique, which can only be detected at apply time.
    pub bucket_name: String,
    pub website: Option<WebsiteHosting>,
    pub public_read: bool,
    pub block_public_access: BlockPublicAccess,
    pub removal_policy: RemovalPolicy,
    /// empty the bucket when the stack is deleted so that `Destroy` can succeed
    /// on a bucket that still contains objects.
    pub auto_delete_objects: bool,
}

impl S3Bucket {
    /// direct-public mode: website hosting on, anyone can read, ACL writes blocked.
    pub fn public_website(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            website: Some(WebsiteHosting::default()),
            public_read: true,
            block_public_access: BlockPublicAccess::BlockAcls,
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: true,
        }
    }

    /// origin-only mode: fully private, only readable by the distribution.
    pub fn cdn_origin(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            website: None,
            public_read: false,
            block_public_access: BlockPublicAccess::BlockAll,
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: true,
        }
    }
}

impl CfnResource for S3Bucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "BucketName": self.bucket_name,
            "PublicAccessBlockConfiguration": self.block_public_access.configuration(),
        });
        if let Some(website) = &self.website {
            let mut website_config = json!({ "IndexDocument": website.index_document });
            if let Some(error_document) = &website.error_document {
                website_config["ErrorDocument"] = json!(error_document);
            }
            props["WebsiteConfiguration"] = website_config;
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(err) = verify_bucket_name(&self.bucket_name) {
            return Err(err);
        }
        if self.public_read && self.block_public_access == BlockPublicAccess::BlockAll {
            return Err(format!("Bucket {} is public-read but blocks all public access. Use BlockAcls for public buckets", self.bucket_name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketGrant {
    /// `s3:GetObject` for everyone.
    PublicRead,
    /// `s3:GetObject` for cloudfront, scoped to a single distribution.
    CloudfrontOrigin { distribution_logical_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3BucketPolicy {
    pub bucket_logical_id: String,
    pub grant: BucketGrant,
}

impl CfnResource for S3BucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    fn properties(&self) -> Value {
        let objects = sub(format!("arn:${{AWS::Partition}}:s3:::${{{}}}/*", self.bucket_logical_id));
        let statement = match &self.grant {
            BucketGrant::PublicRead => json!({
                "Effect": "Allow",
                "Principal": "*",
                "Action": "s3:GetObject",
                "Resource": objects,
            }),
            BucketGrant::CloudfrontOrigin { distribution_logical_id } => json!({
                "Effect": "Allow",
                "Principal": { "Service": "cloudfront.amazonaws.com" },
                "Action": "s3:GetObject",
                "Resource": objects,
                "Condition": {
                    "StringEquals": {
                        "AWS:SourceArn": sub(format!(
                            "arn:${{AWS::Partition}}:cloudfront::${{AWS::AccountId}}:distribution/${{{}}}",
                            distribution_logical_id
                        )),
                    }
                },
            }),
        };
        json!({
            "Bucket": get_ref(&self.bucket_logical_id),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [statement],
            },
        })
    }
}

/// role assumed by the cleanup lambda. only allowed to list + delete in its own bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRole {
    pub bucket_logical_id: String,
}

impl CfnResource for CleanupRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }

    fn properties(&self) -> Value {
        let bucket = &self.bucket_logical_id;
        json!({
            "Description": format!("empties {bucket} when its stack is deleted"),
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "lambda.amazonaws.com" },
                    "Action": "sts:AssumeRole",
                }],
            },
            "ManagedPolicyArns": [
                sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
            ],
            "Policies": [{
                "PolicyName": "cleanup-bucket",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [
                        {
                            "Effect": "Allow",
                            "Action": "s3:ListBucket",
                            "Resource": get_att(bucket, "Arn"),
                        },
                        {
                            "Effect": "Allow",
                            "Action": "s3:DeleteObject",
                            "Resource": sub(format!("arn:${{AWS::Partition}}:s3:::${{{bucket}}}/*")),
                        },
                    ],
                },
            }],
        })
    }
}

const CLEANUP_HANDLER: &str = r#"import boto3
import cfnresponse

def empty(name):
    boto3.resource('s3').Bucket(name).objects.all().delete()

def handler(event, context):
    status = cfnresponse.SUCCESS
    try:
        kind = event['RequestType']
        if kind == 'Delete':
            empty(event['ResourceProperties']['BucketName'])
        elif kind == 'Update':
            old = event.get('OldResourceProperties', {}).get('BucketName')
            if old and old != event['ResourceProperties']['BucketName']:
                empty(old)
    except Exception as e:
        print(e)
        status = cfnresponse.FAILED
    cfnresponse.send(event, context, status, {})
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFunction {
    pub role_logical_id: String,
}

impl CfnResource for CleanupFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }

    fn properties(&self) -> Value {
        json!({
            "Runtime": "python3.12",
            "Handler": "index.handler",
            "Timeout": 300,
            "Role": get_att(&self.role_logical_id, "Arn"),
            "Code": { "ZipFile": CLEANUP_HANDLER },
        })
    }
}

/// the custom resource whose `Delete` event invokes the cleanup function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTrigger {
    pub function_logical_id: String,
    pub bucket_logical_id: String,
}

impl CfnResource for CleanupTrigger {
    fn type_string(&self) -> &'static str {
        "Custom::CleanupBucket"
    }

    fn properties(&self) -> Value {
        json!({
            "ServiceToken": get_att(&self.function_logical_id, "Arn"),
            "BucketName": get_ref(&self.bucket_logical_id),
        })
    }
}
