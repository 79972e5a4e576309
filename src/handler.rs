//! HTTP glue: one process-wide [`Ctx`] and a router that maps routes onto
//! [`ResourceRegistry`] operations.

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb as ddb;
use bytes::Bytes;
use lambda_http::{Body, Error, Request, Response};
use serde_json::json;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::caller_id;
use crate::blob::ObjectBlobStore;
use crate::chat::{ChatBot, ChatEvent};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::id::is_valid_code;
use crate::model::{
    CreateLinkReq, CreateResp, Locator, MediaType, Mutation, ResourceKind, UpdateReq,
};
use crate::registry::DynamoRegistry;
use crate::service::ResourceRegistry;
use crate::transform::Passthrough;
use crate::users::DynamoDefaults;
use crate::util::{resp_json, SystemClock};

#[derive(Clone)]
pub struct Ctx {
    pub config: Arc<Config>,
    pub service: ResourceRegistry,
    pub chat: ChatBot,
}

impl Ctx {
    pub fn new(config: Config, service: ResourceRegistry, chat: ChatBot) -> Self {
        Self {
            config: Arc::new(config),
            service,
            chat,
        }
    }

    /// Wire the production collaborators: DynamoDB tables and an S3 bucket.
    pub async fn from_env() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let ddb = ddb::Client::new(&aws);

        let registry = Arc::new(DynamoRegistry::new(
            ddb.clone(),
            &config.links_table,
            &config.media_table,
            &config.owner_index,
        ));
        let blobs = Arc::new(ObjectBlobStore::s3(
            config.require_bucket()?,
            config.media_prefix.clone(),
        )?);
        let service = ResourceRegistry::new(
            registry,
            blobs,
            Arc::new(Passthrough),
            Arc::new(SystemClock),
            config.policy.clone(),
        );
        let defaults = Arc::new(DynamoDefaults::new(
            ddb,
            &config.chat_defaults_table,
            config.policy.chat_default_expiration_secs,
        ));
        let chat = ChatBot::new(service.clone(), defaults, config.domain.clone());
        tracing::info!(
            links_table = %config.links_table,
            media_table = %config.media_table,
            "context ready"
        );
        Ok(Self::new(config, service, chat))
    }
}

pub fn json_err(status: u16, code: &'static str, message: impl Into<Cow<'static, str>>) -> Response<Body> {
    resp_json(status, json!({ "error": code, "message": message.into() }))
}

fn error_response(e: &CoreError) -> Response<Body> {
    if let CoreError::Internal(detail) = e {
        tracing::error!(detail = %detail, "request failed");
    }
    let mut body = json!({ "error": e.code(), "message": e.public_message() });
    if e.is_retryable() {
        body["retryable"] = json!(true);
    }
    resp_json(e.status(), body)
}

fn unauthorized() -> Response<Body> {
    json_err(401, "unauthorized", "Requires authentication")
}

fn not_found() -> Response<Body> {
    error_response(&CoreError::NotFound)
}

fn query_params(req: &Request) -> HashMap<String, String> {
    let qp = req.uri().query().unwrap_or("");
    url::form_urlencoded::parse(qp.as_bytes()).into_owned().collect()
}

fn body_bytes(req: &Request) -> Bytes {
    match req.body() {
        Body::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
        Body::Binary(b) => Bytes::copy_from_slice(b),
        _ => Bytes::new(),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(req: &Request) -> CoreResult<T> {
    serde_json::from_slice(&body_bytes(req)).map_err(|e| CoreError::validation(format!("bad json: {e}")))
}

fn parse_num<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str, default: T) -> CoreResult<T> {
    match params.get(key) {
        Some(v) => v
            .parse()
            .map_err(|_| CoreError::validation(format!("{key} must be a number"))),
        None => Ok(default),
    }
}

/// Route a request under the configured deadline.
pub async fn router(req: Request, ctx: &Ctx) -> Result<Response<Body>, Error> {
    let caller = caller_id(&req, ctx.config.auth_issuer.as_deref()).map(|c| c.user_id);
    let work = dispatch(&req, ctx, caller.as_deref());
    let resp = match tokio::time::timeout(ctx.config.request_timeout, work).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => error_response(&e),
        Err(elapsed) => error_response(&CoreError::from(elapsed)),
    };
    Ok(resp)
}

async fn dispatch(req: &Request, ctx: &Ctx, caller: Option<&str>) -> CoreResult<Response<Body>> {
    let method = req.method().as_str();
    let path = req.uri().path();
    let segs: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segs.as_slice()) {
        ("POST", ["v1", "links"]) => create_link(req, ctx, caller).await,
        ("GET", ["v1", "links", code]) => resolve_link(ctx, code, caller).await,
        ("POST", ["v1", "media", media_type]) => match media_type.parse::<MediaType>() {
            Ok(mt) => upload_media(req, ctx, caller, mt).await,
            Err(_) => Ok(not_found()),
        },
        ("GET", ["v1", "media", code]) => resolve_media(req, ctx, code, caller).await,
        ("GET", ["v1", "me", kind]) => match (kind.parse::<ResourceKind>(), caller) {
            (Err(_), _) => Ok(not_found()),
            (Ok(_), None) => Ok(unauthorized()),
            (Ok(kind), Some(owner)) => list_owned(req, ctx, kind, owner).await,
        },
        ("PUT", ["v1", kind, code]) => match (kind.parse::<ResourceKind>(), caller) {
            (Err(_), _) => Ok(not_found()),
            (Ok(_), None) => Ok(unauthorized()),
            (Ok(kind), Some(owner)) => update(req, ctx, kind, code, owner).await,
        },
        ("DELETE", ["v1", kind, code]) => match (kind.parse::<ResourceKind>(), caller) {
            (Err(_), _) => Ok(not_found()),
            (Ok(_), None) => Ok(unauthorized()),
            (Ok(kind), Some(owner)) => delete(ctx, kind, code, owner).await,
        },
        ("POST", ["v1", "chat", "events"]) => match caller {
            None => Ok(unauthorized()),
            Some(user) => {
                let event: ChatEvent = parse_json(req)?;
                chat_reply(ctx, user, event).await
            }
        },
        ("POST", ["v1", "chat", media_type]) => match (media_type.parse::<MediaType>(), caller) {
            (Err(_), _) => Ok(not_found()),
            (Ok(_), None) => Ok(unauthorized()),
            (Ok(MediaType::Image), Some(user)) => {
                chat_reply(ctx, user, ChatEvent::Image(body_bytes(req))).await
            }
            (Ok(MediaType::Video), Some(user)) => {
                chat_reply(ctx, user, ChatEvent::Video(body_bytes(req))).await
            }
        },
        _ => Ok(not_found()),
    }
}

async fn create_link(req: &Request, ctx: &Ctx, caller: Option<&str>) -> CoreResult<Response<Body>> {
    let payload: CreateLinkReq = parse_json(req)?;
    let link = ctx.service.create_link(caller, &payload.lead_url).await?;
    let out = CreateResp {
        short_url: ctx.config.short_url(&link.code),
        code: link.code,
        expires_at: None,
    };
    Ok(resp_json(201, json!(out)))
}

async fn resolve_link(ctx: &Ctx, code: &str, caller: Option<&str>) -> CoreResult<Response<Body>> {
    if !is_valid_code(code) {
        return Ok(not_found());
    }
    match ctx.service.resolve(ResourceKind::Link, code, "", caller).await? {
        Locator::LeadUrl(target) => Response::builder()
            .status(301)
            .header("Location", target)
            .header("Cache-Control", "no-store")
            .body(Body::Empty)
            .map_err(|e| CoreError::internal(format!("resp: {e}"))),
        Locator::Blob { .. } => Ok(not_found()),
    }
}

async fn upload_media(
    req: &Request,
    ctx: &Ctx,
    caller: Option<&str>,
    media_type: MediaType,
) -> CoreResult<Response<Body>> {
    let params = query_params(req);
    let expiration = parse_num(&params, "expiration", 0u64)?;
    let password = params.get("password").map(String::as_str).unwrap_or("");
    let rec = ctx
        .service
        .upload_media(caller, media_type, body_bytes(req), password, expiration)
        .await?;
    let out = CreateResp {
        short_url: ctx.config.short_url(&rec.code),
        code: rec.code,
        expires_at: Some(rec.expires_at),
    };
    Ok(resp_json(201, json!(out)))
}

async fn resolve_media(
    req: &Request,
    ctx: &Ctx,
    code: &str,
    caller: Option<&str>,
) -> CoreResult<Response<Body>> {
    if !is_valid_code(code) {
        return Ok(not_found());
    }
    let params = query_params(req);
    let password = params.get("password").map(String::as_str).unwrap_or("");
    match ctx.service.resolve(ResourceKind::Media, code, password, caller).await? {
        Locator::Blob {
            storage_key,
            media_type,
        } => {
            let bytes = ctx.service.fetch_blob(&storage_key).await?;
            Response::builder()
                .status(200)
                .header("Content-Type", "application/octet-stream")
                .header("X-Media-Type", media_type.as_str())
                .header("Cache-Control", "private, no-store")
                .body(Body::Binary(bytes.to_vec()))
                .map_err(|e| CoreError::internal(format!("resp: {e}")))
        }
        Locator::LeadUrl(_) => Ok(not_found()),
    }
}

async fn list_owned(req: &Request, ctx: &Ctx, kind: ResourceKind, owner: &str) -> CoreResult<Response<Body>> {
    let params = query_params(req);
    let page = parse_num(&params, "page", 1u32)?;
    let limit = parse_num(&params, "limit", 10u32)?;
    let listed = ctx.service.list_owned(kind, owner, page, limit).await?;
    Ok(resp_json(
        200,
        json!({ "items": listed.items, "total": listed.total, "page": page }),
    ))
}

async fn update(
    req: &Request,
    ctx: &Ctx,
    kind: ResourceKind,
    code: &str,
    owner: &str,
) -> CoreResult<Response<Body>> {
    if !is_valid_code(code) {
        return Ok(not_found());
    }
    let payload: UpdateReq = parse_json(req)?;
    let results = ctx.service.update_fields(kind, code, owner, &payload).await?;
    let ok = results.iter().all(|r| r.ok);
    Ok(resp_json(200, json!({ "ok": ok, "results": results })))
}

async fn delete(ctx: &Ctx, kind: ResourceKind, code: &str, owner: &str) -> CoreResult<Response<Body>> {
    if !is_valid_code(code) {
        return Ok(not_found());
    }
    ctx.service
        .update_owned(kind, code, owner, Mutation::Delete)
        .await?;
    Response::builder()
        .status(204)
        .body(Body::Empty)
        .map_err(|e| CoreError::internal(format!("resp: {e}")))
}

async fn chat_reply(ctx: &Ctx, user: &str, event: ChatEvent) -> CoreResult<Response<Body>> {
    let reply = ctx.chat.handle(user, event).await;
    Ok(resp_json(200, json!({ "reply": reply, "text": reply.text() })))
}
