//! Object-storage providers.
//!
//! The [`client::ProviderClient`] trait abstracts over the remote storage
//! account whose metadata is mirrored.  [`aws::AwsProviderClient`] talks to
//! AWS S3 and S3-compatible endpoints.

pub mod aws;
pub mod client;

#[cfg(test)]
pub(crate) mod mock;
