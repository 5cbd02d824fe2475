//! Caller identity for audit rows
//!
//! Resolution order: `X-Auth-User`, `X-Forwarded-User`, first hop of
//! `X-Forwarded-For`, peer address, then `"unknown"`.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

pub const UNKNOWN_REQUESTOR: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requestor(pub String);

impl Requestor {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let forwarded_for = || {
            header("x-forwarded-for").and_then(|v| {
                v.split(',')
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        };

        let name = header("x-auth-user")
            .or_else(|| header("x-forwarded-user"))
            .or_else(forwarded_for)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_REQUESTOR.to_string());

        Self(name)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Requestor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}
