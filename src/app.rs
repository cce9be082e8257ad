use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::claim_cookie::COOKIE_NAME;
use crate::config::Config;
use crate::coupons::CouponPool;
use crate::service::{Claim, ClaimOutcome, ClaimService, Status};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    restricted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_left: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestrictedResponse {
    message: &'static str,
    time_left: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimResponse {
    success: bool,
    coupon: String,
    restriction_time: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ClaimService>,
    pub production: bool,
    pub trust_proxy: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = CouponPool::new(config.coupons.clone())?;
        let window = config.restriction_window_seconds;
        let service = match config.max_tracked_ips {
            Some(max) => ClaimService::bounded(pool, window, max),
            None => ClaimService::new(pool, window),
        };
        Ok(Self {
            service: Arc::new(service),
            production: config.production,
            trust_proxy: config.trust_proxy,
        })
    }
}

/// Client identity as seen by the IP ledger, in canonical textual form.
/// Requests without a usable address share the empty-string bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_proxy {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(raw) = forwarded {
                let ip = raw
                    .parse::<IpAddr>()
                    .map(|ip| ip.to_string())
                    .unwrap_or_default();
                if ip.is_empty() {
                    debug!("Unparseable X-Forwarded-For entry: {:?}", raw);
                }
                return Ok(ClientIp(ip));
            }
        }

        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();
        Ok(ClientIp(peer))
    }
}

pub fn build_app(config: &Config) -> anyhow::Result<Router> {
    let state = AppState::from_config(config)?;
    build_router(state, &config.origin)
}

pub fn build_router(state: AppState, origin: &str) -> anyhow::Result<Router> {
    let app = Router::new()
        .route("/check-status", get(check_status_handler))
        .route("/claim-coupon", post(claim_handler))
        .layer(cors_layer(origin)?)
        .with_state(state);
    Ok(app)
}

/// `*` allows any origin without credentials; a concrete origin is echoed back
/// with credentials so the claim cookie travels cross-site.
fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let methods = [Method::GET, Method::POST];
    if origin == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any));
    }

    let origin = HeaderValue::from_str(origin)
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin {origin:?}: {e}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

fn cookie_value(jar: &CookieJar) -> Option<String> {
    jar.get(COOKIE_NAME).map(|c| c.value().to_string())
}

fn build_claim_cookie(claim: &Claim, production: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, claim.cookie().to_value()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(production)
        .max_age(time::Duration::seconds(
            i64::try_from(claim.restriction_window).unwrap_or(i64::MAX),
        ))
        .build()
}

async fn check_status_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
) -> Json<StatusResponse> {
    let status = state.service.check_status(&ip, cookie_value(&jar).as_deref());
    debug!("Status check from IP: {:?} -> {:?}", ip, status);

    Json(match status {
        Status::Unrestricted => StatusResponse {
            restricted: false,
            time_left: None,
            message: None,
        },
        Status::Restricted(restriction) => StatusResponse {
            restricted: true,
            time_left: Some(restriction.time_left),
            message: Some(restriction.message()),
        },
    })
}

async fn claim_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
) -> Response {
    match state.service.claim(&ip, cookie_value(&jar).as_deref()) {
        ClaimOutcome::Restricted(restriction) => {
            warn!(
                "Claim rejected for IP: {:?} ({:?}, {}s left)",
                ip, restriction.reason, restriction.time_left
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RestrictedResponse {
                    message: restriction.message(),
                    time_left: restriction.time_left,
                }),
            )
                .into_response()
        }
        ClaimOutcome::Issued(claim) => {
            info!("Issued coupon {} to IP: {:?}", claim.coupon, ip);
            let jar = jar.add(build_claim_cookie(&claim, state.production));
            (
                jar,
                Json(ClaimResponse {
                    success: true,
                    coupon: claim.coupon,
                    restriction_time: claim.restriction_window,
                }),
            )
                .into_response()
        }
    }
}
