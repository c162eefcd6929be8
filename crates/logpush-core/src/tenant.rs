//! Tenant identity extraction.
//!
//! The owning tenant is carried in the `X-Scope-OrgID` header. It is read
//! once per request and never changes afterwards.

use http::HeaderMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Header carrying the tenant (organisation) ID
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Separator used by clients that address several tenants at once
const TENANT_SEPARATOR: char = '|';

const MAX_TENANT_ID_LENGTH: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    #[error("no org id")]
    Missing,
    #[error("multiple org IDs present")]
    Multiple,
    #[error("tenant ID is too long: max {MAX_TENANT_ID_LENGTH} characters")]
    TooLong,
    #[error("tenant ID is '.' or '..'")]
    Unsafe,
    #[error("tenant ID '{id}' contains unsupported character '{ch}'")]
    UnsupportedCharacter { id: String, ch: char },
}

/// Opaque, validated tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(Arc<str>);

impl TenantId {
    /// Validate `id` and wrap it
    pub fn new(id: &str) -> Result<Self, TenantError> {
        validate_tenant_id(id)?;
        Ok(Self(Arc::from(id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_tenant_id(id: &str) -> Result<(), TenantError> {
    if id.is_empty() {
        return Err(TenantError::Missing);
    }
    if id.len() > MAX_TENANT_ID_LENGTH {
        return Err(TenantError::TooLong);
    }
    if id == "." || id == ".." {
        return Err(TenantError::Unsafe);
    }
    if let Some(ch) = id.chars().find(|c| !is_supported_char(*c)) {
        return Err(TenantError::UnsupportedCharacter {
            id: id.to_string(),
            ch,
        });
    }
    Ok(())
}

fn is_supported_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '!' | '-' | '_' | '.' | '*' | '\'' | '(' | ')')
}

/// How the tenant of a request is determined
#[derive(Debug, Clone)]
pub enum TenantSource {
    /// Read the `X-Scope-OrgID` header
    Header,
    /// Attribute every request to one tenant (auth disabled)
    Fixed(TenantId),
}

impl TenantSource {
    pub fn tenant_id(&self, headers: &HeaderMap) -> Result<TenantId, TenantError> {
        match self {
            TenantSource::Header => tenant_id_from_headers(headers),
            TenantSource::Fixed(tenant) => Ok(tenant.clone()),
        }
    }
}

/// Extract exactly one tenant from the request headers
pub fn tenant_id_from_headers(headers: &HeaderMap) -> Result<TenantId, TenantError> {
    let mut values = headers.get_all(ORG_ID_HEADER).iter();
    let value = values.next().ok_or(TenantError::Missing)?;
    if values.next().is_some() {
        return Err(TenantError::Multiple);
    }

    let raw = value.to_str().map_err(|_| TenantError::Missing)?.trim();
    if raw.contains(TENANT_SEPARATOR) {
        return Err(TenantError::Multiple);
    }
    TenantId::new(raw)
}
