//! Declares and deploys a static website: an S3 bucket, optionally fronted by
//! cloudfront with an ACM certificate and route53 aliases, plus an asset sync that
//! mirrors a local directory into the bucket and invalidates the CDN cache.

pub mod deployment;
pub mod error;
pub mod graph;
pub mod outputs;
pub mod pipeline;
pub mod resources;
pub mod stack;
pub mod variables;

pub use error::{Error, Result};
