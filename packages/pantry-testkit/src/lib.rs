use std::{
	collections::VecDeque,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Map;
use time::{Duration as TimeDuration, OffsetDateTime, macros::datetime};

use pantry_config::{
	Cache, Config, GenerationProviderConfig, Image, ImageProviderConfig, Providers as ProviderCfg,
	RateLimit, Revalidation, Search, Service,
};
use pantry_service::{BoxFuture, Clock, GenerationProvider, ImageProvider, Providers, RecipeService};

pub const START: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);
pub const UNSET_CREDENTIAL_ENV: &str = "PANTRY_TESTKIT_UNSET_CREDENTIAL";

/// Clock that only moves when a test says so.
pub struct ManualClock {
	now: Mutex<OffsetDateTime>,
}
impl ManualClock {
	pub fn new(now: OffsetDateTime) -> Self {
		Self { now: Mutex::new(now) }
	}

	pub fn advance(&self, by: TimeDuration) {
		let mut now = self.now.lock().unwrap_or_else(|err| err.into_inner());

		*now += by;
	}

	pub fn set(&self, to: OffsetDateTime) {
		*self.now.lock().unwrap_or_else(|err| err.into_inner()) = to;
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(START)
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[derive(Debug, Clone)]
pub enum Reply {
	Text(String),
	Timeout,
	MissingCredential,
	Status(u16),
}
impl Reply {
	fn into_result(self) -> pantry_providers::Result<String> {
		match self {
			Self::Text(text) => Ok(text),
			Self::Timeout => Err(pantry_providers::Error::Timeout { timeout_ms: 25_000 }),
			Self::MissingCredential => Err(pantry_providers::Error::MissingCredential {
				env: UNSET_CREDENTIAL_ENV.to_string(),
			}),
			Self::Status(status) =>
				Err(pantry_providers::Error::Status { status, body: String::new() }),
		}
	}
}

/// Generation provider that plays back queued replies. The last reply repeats once the queue
/// runs dry.
pub struct ScriptedGenerator {
	replies: Mutex<VecDeque<Reply>>,
	last: Mutex<Option<Reply>>,
	delay: Option<Duration>,
	calls: AtomicUsize,
}
impl ScriptedGenerator {
	pub fn new<I>(replies: I) -> Self
	where
		I: IntoIterator<Item = Reply>,
	{
		Self {
			replies: Mutex::new(replies.into_iter().collect()),
			last: Mutex::new(None),
			delay: None,
			calls: AtomicUsize::new(0),
		}
	}

	pub fn always(text: impl Into<String>) -> Self {
		Self::new([Reply::Text(text.into())])
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn next_reply(&self) -> Reply {
		let queued = self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front();
		let mut last = self.last.lock().unwrap_or_else(|err| err.into_inner());

		match queued {
			Some(reply) => {
				*last = Some(reply.clone());

				reply
			},
			None => last.clone().unwrap_or(Reply::Status(500)),
		}
	}
}
impl GenerationProvider for ScriptedGenerator {
	fn generate<'a>(
		&'a self,
		_: &'a GenerationProviderConfig,
		_: &'a str,
		_: &'a [String],
	) -> BoxFuture<'a, pantry_providers::Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let reply = self.next_reply();

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			reply.into_result()
		})
	}
}

pub struct StubImages {
	url: String,
	calls: AtomicUsize,
}
impl StubImages {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into(), calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl Default for StubImages {
	fn default() -> Self {
		Self::new("https://images.example.com/generated.png")
	}
}
impl ImageProvider for StubImages {
	fn generate_image<'a>(
		&'a self,
		_: &'a ImageProviderConfig,
		_: &'a str,
	) -> BoxFuture<'a, pantry_providers::Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let url = self.url.clone();

		Box::pin(async move { Ok(url) })
	}
}

/// In-process service wired to scripted providers and a manual clock.
pub struct Harness {
	pub service: Arc<RecipeService>,
	pub clock: Arc<ManualClock>,
	pub generator: Arc<ScriptedGenerator>,
	pub images: Arc<StubImages>,
}
impl Harness {
	/// Must be called from within a Tokio runtime.
	pub fn new(cfg: Config, generator: ScriptedGenerator) -> Self {
		let clock = Arc::new(ManualClock::default());
		let generator = Arc::new(generator);
		let images = Arc::new(StubImages::default());
		let providers = Providers::new(generator.clone(), images.clone());
		let service = RecipeService::with_parts(cfg, providers, clock.clone());

		Self { service: Arc::new(service), clock, generator, images }
	}
}

pub fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
			trust_forwarded_headers: true,
		},
		rate_limit: RateLimit::default(),
		cache: Cache::default(),
		revalidation: Revalidation::default(),
		search: Search::default(),
		image: Image::default(),
		providers: ProviderCfg {
			generation: GenerationProviderConfig {
				api_base: "http://127.0.0.1:9".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "test".to_string(),
				api_key_env: UNSET_CREDENTIAL_ENV.to_string(),
				temperature: 0.2,
				max_tokens: 3_000,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			image: ImageProviderConfig {
				api_base: "http://127.0.0.1:9".to_string(),
				path: "/v1/images/generations".to_string(),
				model: "test".to_string(),
				api_key_env: UNSET_CREDENTIAL_ENV.to_string(),
				size: "1024x1024".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
	}
}

/// A well-formed upstream reply carrying `count` recipes.
pub fn recipe_reply(count: usize) -> String {
	let recipes = (1..=count)
		.map(|i| {
			serde_json::json!({
				"id": format!("r{i}"),
				"title": format!("Recipe {i}"),
				"description": "Quick and simple.",
				"ingredients": ["salt", "pepper"],
				"instructions": ["Mix.", "Serve."],
				"prepTime": "10 minutes",
				"dietaryInfo": ["vegetarian"],
			})
		})
		.collect::<Vec<_>>();

	serde_json::Value::Array(recipes).to_string()
}
