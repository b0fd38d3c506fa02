use std::{net::SocketAddr, time::Duration};

use axum::{
	Json, Router,
	extract::{ConnectInfo, State, rejection::JsonRejection},
	http::{Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

use pantry_service::{Error as ServiceError, ImageRequest, RateDecision, SearchRequest};

use crate::state::AppState;

const ANONYMOUS: &str = "anonymous";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/search", post(search))
		.route("/api/image", post(image))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Serialize)]
struct SearchResponse {
	result: String,
}

#[derive(Debug, Serialize)]
struct ImageResponse {
	url: String,
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	extensions: Extensions,
	payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
	let request_id = Uuid::new_v4();
	let peer = extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
	let identity =
		client_identity(&headers, peer, state.service.cfg.service.trust_forwarded_headers);
	let span = tracing::info_span!("search", %request_id, %identity);
	let response = async {
		let Json(req) = payload.map_err(ApiError::from)?;
		let outcome = state
			.service
			.search(req, &identity)
			.await
			.map_err(|err| ApiError::from_service(err, state.service.now()))?;
		let mut headers = HeaderMap::new();

		set_header(&mut headers, "x-cache", outcome.cache.as_str());
		set_rate_headers(&mut headers, &outcome.rate);
		set_header(&mut headers, "x-timing-admission", millis(outcome.timings.admission));
		set_header(&mut headers, "x-timing-cache", millis(outcome.timings.cache));

		if let Some(upstream) = outcome.timings.upstream {
			set_header(&mut headers, "x-timing-upstream", millis(upstream));
		}

		set_header(&mut headers, "x-timing-total", millis(outcome.timings.total));

		let body = SearchResponse { result: outcome.result };

		Ok::<_, ApiError>((headers, Json(body)).into_response())
	}
	.instrument(span)
	.await;

	finish(response, request_id)
}

async fn image(
	State(state): State<AppState>,
	payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Response {
	let request_id = Uuid::new_v4();
	let response = async {
		let Json(req) = payload.map_err(ApiError::from)?;
		let outcome = state
			.service
			.generate_image(req)
			.await
			.map_err(|err| ApiError::from_service(err, state.service.now()))?;
		let mut headers = HeaderMap::new();

		set_rate_headers(&mut headers, &outcome.rate);

		Ok::<_, ApiError>((headers, Json(ImageResponse { url: outcome.url })).into_response())
	}
	.instrument(tracing::info_span!("image", %request_id))
	.await;

	finish(response, request_id)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_identity(
	headers: &HeaderMap,
	peer: Option<SocketAddr>,
	trust_forwarded: bool,
) -> String {
	if trust_forwarded {
		let forwarded = header_str(headers, "x-forwarded-for")
			.and_then(|value| value.split(',').next())
			.map(str::trim)
			.filter(|value| !value.is_empty());
		let real_ip =
			header_str(headers, "x-real-ip").map(str::trim).filter(|value| !value.is_empty());

		if let Some(identity) = forwarded.or(real_ip) {
			return identity.to_string();
		}
	}

	peer.map(|addr| addr.ip().to_string()).unwrap_or_else(|| ANONYMOUS.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|value| value.to_str().ok())
}

fn finish(result: Result<Response, ApiError>, request_id: Uuid) -> Response {
	let mut response = result.unwrap_or_else(IntoResponse::into_response);

	set_header(response.headers_mut(), "x-request-id", request_id);

	response
}

fn set_rate_headers(headers: &mut HeaderMap, rate: &RateDecision) {
	set_header(headers, "x-ratelimit-limit", rate.limit);
	set_header(headers, "x-ratelimit-remaining", rate.remaining);
	set_header(headers, "x-ratelimit-reset", rate.reset_at.unix_timestamp());
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
	if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
		headers.insert(HeaderName::from_static(name), value);
	}
}

fn millis(duration: Duration) -> String {
	format!("{:.3}", duration.as_secs_f64() * 1_000.0)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
	rate: Option<RateDecision>,
	retry_after_secs: Option<i64>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self {
			status,
			error_code: error_code.into(),
			message: message.into(),
			fields,
			rate: None,
			retry_after_secs: None,
		}
	}

	/// Upstream details stay in the logs; clients only see a generic message.
	pub fn from_service(err: ServiceError, now: OffsetDateTime) -> Self {
		match err {
			ServiceError::InvalidRequest { field, message } => json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				message,
				Some(vec![field.to_string()]),
			),
			ServiceError::RateLimited { decision } => {
				let retry_after_secs = (decision.reset_at - now).whole_seconds().max(1);
				let mut err = json_error(
					StatusCode::TOO_MANY_REQUESTS,
					"rate_limited",
					format!("Too many requests. Try again in {retry_after_secs} seconds."),
					None,
				);

				err.rate = Some(decision);
				err.retry_after_secs = Some(retry_after_secs);

				err
			},
			ServiceError::Configuration { .. } => json_error(
				StatusCode::INTERNAL_SERVER_ERROR,
				"configuration_error",
				"The service is not configured correctly.",
				None,
			),
			ServiceError::UpstreamTimeout { .. } => json_error(
				StatusCode::INTERNAL_SERVER_ERROR,
				"upstream_timeout",
				"The recipe generator took too long to respond. Please try again.",
				None,
			),
			ServiceError::Upstream { .. } => json_error(
				StatusCode::INTERNAL_SERVER_ERROR,
				"upstream_error",
				"The recipe generator is unavailable right now. Please try again later.",
				None,
			),
			ServiceError::MalformedResponse { .. } => json_error(
				StatusCode::INTERNAL_SERVER_ERROR,
				"malformed_response",
				"The recipe generator returned an unreadable answer. Try rephrasing your search.",
				None,
			),
		}
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text(), None)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let mut headers = HeaderMap::new();

		if let Some(rate) = &self.rate {
			set_rate_headers(&mut headers, rate);
		}
		if let Some(secs) = self.retry_after_secs {
			headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
		}

		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, headers, Json(body)).into_response()
	}
}
