use std::convert::Infallible;
use std::fmt;

use actix_web::http::StatusCode;
use actix_web::http::header::CACHE_CONTROL;
use actix_web::{error, get, post, web, HttpResponse, Responder, ResponseError};
use futures::StreamExt;
use serde::Serialize;

use ai_gen_core::error::GenerateError;
use ai_gen_core::orchestrator::Orchestrator;
use ai_gen_core::request::GenerateRequest;
use ai_gen_core::stream::{event_stream, EVENT_STREAM_CONTENT_TYPE};

/// State shared by every worker. Read-only after startup.
pub struct AppState {
	pub orchestrator: Orchestrator,
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
}

#[derive(Serialize)]
struct HealthReport {
	ok: bool,
	remote: bool,
	prefixes: usize,
}

/// A request rejected before any stream was opened.
#[derive(Debug)]
pub struct ApiError(GenerateError);

impl From<GenerateError> for ApiError {
	fn from(e: GenerateError) -> Self {
		Self(e)
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl ResponseError for ApiError {
	fn status_code(&self) -> StatusCode {
		if self.0.is_configuration() {
			StatusCode::UNPROCESSABLE_ENTITY
		} else {
			StatusCode::BAD_REQUEST
		}
	}

	fn error_response(&self) -> HttpResponse {
		HttpResponse::build(self.status_code()).json(ErrorBody { error: self.0.to_string() })
	}
}

/// HTTP POST endpoint `/api/generate`
///
/// Validates the request, then streams the generated text as
/// `text/event-stream`, one `data:` event per chunk, ending with
/// `{"done": true}`. Invalid requests get a JSON error and no stream.
#[post("/api/generate")]
async fn generate(
	data: web::Data<AppState>,
	body: web::Json<GenerateRequest>,
) -> Result<HttpResponse, ApiError> {
	let session = data.orchestrator.start(body.into_inner())?;
	let events = event_stream(session).map(|event| Ok::<_, Infallible>(web::Bytes::from(event)));

	Ok(HttpResponse::Ok()
		.content_type(EVENT_STREAM_CONTENT_TYPE)
		.insert_header((CACHE_CONTROL, "no-cache"))
		.insert_header(("X-Accel-Buffering", "no"))
		.streaming(events))
}

#[get("/health")]
async fn health(data: web::Data<AppState>) -> impl Responder {
	HttpResponse::Ok().json(HealthReport {
		ok: true,
		remote: data.orchestrator.remote_configured(),
		prefixes: data.orchestrator.table().len(),
	})
}

/// JSON extractor settings: any content type, errors as `{"error": ...}`.
fn json_config() -> web::JsonConfig {
	web::JsonConfig::default()
		.content_type_required(false)
		.error_handler(|err, _req| {
			let body = ErrorBody { error: format!("Invalid JSON: {err}") };
			error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
		})
}

/// Registers the endpoints and their extractor configuration.
pub fn configure(cfg: &mut web::ServiceConfig) {
	cfg.app_data(json_config()).service(generate).service(health);
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::time::Duration;

	use actix_web::http::header::CONTENT_TYPE;
	use actix_web::{test, App};
	use serde_json::{json, Value};

	use ai_gen_core::corpus::Corpus;
	use ai_gen_core::model::transition_table::TransitionTable;
	use ai_gen_core::provider::{RemoteClient, RemoteConfig};
	use ai_gen_core::request::GenerationSettings;

	use super::*;

	const TEXT: &str = "the quick brown fox jumps over the lazy dog. \
		A lazy afternoon makes the dog sleep while the fox jumps again.";

	fn state(remote: Option<RemoteClient>) -> web::Data<AppState> {
		let corpus = Corpus::from_text(TEXT).unwrap();
		let table = Arc::new(TransitionTable::build(&corpus, 2).unwrap());
		web::Data::new(AppState {
			orchestrator: Orchestrator::new(table, remote, GenerationSettings::default()),
		})
	}

	fn unreachable_remote() -> RemoteClient {
		RemoteClient::new(RemoteConfig {
			api_key: Some("test-key".into()),
			base_url: "http://127.0.0.1:1".into(),
			connect_timeout: Duration::from_secs(2),
			..Default::default()
		})
		.unwrap()
	}

	fn parse_events(body: &[u8]) -> Vec<Value> {
		std::str::from_utf8(body)
			.unwrap()
			.split("\n\n")
			.filter(|event| !event.is_empty())
			.map(|event| serde_json::from_str(event.strip_prefix("data: ").unwrap()).unwrap())
			.collect()
	}

	fn generate_request(body: Value) -> test::TestRequest {
		test::TestRequest::post().uri("/api/generate").set_json(body)
	}

	#[actix_web::test]
	async fn local_generation_streams_tokens_then_done() {
		let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
		let req = generate_request(json!({"prompt": "the quick brown", "provider": "local", "maxTokens": 5})).to_request();
		let resp = test::call_service(&app, req).await;

		assert_eq!(resp.status(), StatusCode::OK);
		assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/event-stream");
		assert_eq!(resp.headers().get(CACHE_CONTROL).unwrap(), "no-cache");
		assert_eq!(resp.headers().get("x-accel-buffering").unwrap(), "no");

		let events = parse_events(&test::read_body(resp).await);
		assert_eq!(events.len(), 6);
		assert_eq!(events[0], json!({"text": "fox ", "done": false}));
		assert_eq!(events[1], json!({"text": "jumps ", "done": false}));
		assert!(events[..5].iter().all(|e| e["done"] == false && e["text"].is_string()));
		assert_eq!(events[5], json!({"done": true}));
	}

	#[actix_web::test]
	async fn auto_without_credential_uses_local() {
		let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
		let req = generate_request(json!({"prompt": "the lazy", "maxTokens": 12})).to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);

		let events = parse_events(&test::read_body(resp).await);
		assert_eq!(events.len(), 13);
		assert_eq!(events.iter().filter(|e| e["done"] == true).count(), 1);
		assert_eq!(events.last().unwrap(), &json!({"done": true}));
	}

	#[actix_web::test]
	async fn auto_with_failing_remote_falls_back_to_local() {
		let app = test::init_service(
			App::new().app_data(state(Some(unreachable_remote()))).configure(configure),
		)
		.await;
		let req = generate_request(json!({"prompt": "the fox", "maxTokens": 4})).to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);

		let events = parse_events(&test::read_body(resp).await);
		assert_eq!(events.len(), 5);
		assert_eq!(events.last().unwrap(), &json!({"done": true}));
	}

	#[actix_web::test]
	async fn explicit_remote_with_failing_remote_ends_with_error_event() {
		let app = test::init_service(
			App::new().app_data(state(Some(unreachable_remote()))).configure(configure),
		)
		.await;
		let req = generate_request(json!({"prompt": "the fox", "provider": "remote"})).to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);

		let events = parse_events(&test::read_body(resp).await);
		assert_eq!(events.len(), 1);
		assert_eq!(events[0]["done"], true);
		assert!(events[0]["error"].is_string());
	}

	#[actix_web::test]
	async fn remote_without_credential_is_rejected() {
		let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
		let req = generate_request(json!({"prompt": "hello", "provider": "remote"})).to_request();
		let resp = test::call_service(&app, req).await;

		assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");
		let body: Value = test::read_body_json(resp).await;
		assert!(body["error"].as_str().unwrap().contains("no API key"));
	}

	#[actix_web::test]
	async fn invalid_requests_are_rejected_before_streaming() {
		let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
		for body in [
			json!({"prompt": "   "}),
			json!({"provider": "local"}),
			json!({"prompt": "hi", "provider": "gemini"}),
			json!({"prompt": "hi", "maxTokens": 0}),
			json!({"prompt": 42}),
		] {
			let resp = test::call_service(&app, generate_request(body.clone()).to_request()).await;
			assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
			let error: Value = test::read_body_json(resp).await;
			assert!(error["error"].is_string(), "{body}");
		}
	}

	#[actix_web::test]
	async fn malformed_json_is_a_client_error() {
		let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
		let req = test::TestRequest::post()
			.uri("/api/generate")
			.insert_header((CONTENT_TYPE, "text/plain"))
			.set_payload("{\"prompt\": ")
			.to_request();
		let resp = test::call_service(&app, req).await;

		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		let error: Value = test::read_body_json(resp).await;
		assert!(error["error"].as_str().unwrap().starts_with("Invalid JSON"));
	}

	#[actix_web::test]
	async fn health_reports_state() {
		let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
		let req = test::TestRequest::get().uri("/health").to_request();
		let body: Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(body["ok"], true);
		assert_eq!(body["remote"], false);
		assert!(body["prefixes"].as_u64().unwrap() > 0);
	}
}
