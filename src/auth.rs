//! Caller identity from the API Gateway authorizer context.
//!
//! Token verification happens in the authorizer; by the time a request
//! reaches us the identity is either attached to the context or absent.
//! Absent means anonymous, which is a valid caller for create and resolve.

use lambda_http::request::RequestContext;
use lambda_http::Request;
use lambda_http::RequestExt;
use serde::Serialize;

use crate::model::OwnerId;

/// Which authorizer flavour produced the identity.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum CallerSource {
    /// Custom Lambda authorizer with simple responses.
    Lambda,
    /// HTTP API JWT authorizer.
    Jwt,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Caller {
    pub user_id: OwnerId,
    pub source: CallerSource,
}

fn caller_from_fields(req: &Request) -> Option<Caller> {
    let ctx = match req.request_context_ref()? {
        RequestContext::ApiGatewayV2(c) => c,
        _ => return None,
    };
    let authz = ctx.authorizer.as_ref()?;
    let sub = authz.fields.get("sub")?.as_str()?;
    if sub.is_empty() {
        return None;
    }
    Some(Caller {
        user_id: sub.to_string(),
        source: CallerSource::Lambda,
    })
}

fn caller_from_jwt(req: &Request, expected_issuer: Option<&str>) -> Option<Caller> {
    let ctx = match req.request_context_ref()? {
        RequestContext::ApiGatewayV2(c) => c,
        _ => {
            tracing::debug!("not an APIGWv2 request");
            return None;
        }
    };
    let claims = &ctx.authorizer.as_ref()?.jwt.as_ref()?.claims;
    let sub = claims.get("sub").map(|v| v.as_str()).filter(|s| !s.is_empty())?;

    if let Some(expected) = expected_issuer.filter(|s| !s.is_empty()) {
        let iss = claims.get("iss").map(|v| v.as_str());
        if iss != Some(expected) {
            tracing::error!("issuer mismatch: expected {}, got {:?}", expected, iss);
            return None;
        }
    }

    Some(Caller {
        user_id: sub.to_string(),
        source: CallerSource::Jwt,
    })
}

/// Identity attached by the authorizer, if any. Lambda-authorizer fields win
/// over JWT claims.
pub fn caller_id(req: &Request, expected_issuer: Option<&str>) -> Option<Caller> {
    caller_from_fields(req).or_else(|| caller_from_jwt(req, expected_issuer))
}
