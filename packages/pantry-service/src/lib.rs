pub mod cache;
pub mod clock;
pub mod image;
pub mod quota;
pub mod rate;
pub mod revalidate;
pub mod search;

mod error;

pub use cache::{CacheEntry, CacheState, CacheStore, LruCacheStore, Resolved, ResponseCache};
pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use image::{ImageOutcome, ImageRequest};
pub use quota::FixedWindowCounter;
pub use rate::{LruRateStore, RateDecision, RateGovernor, RateStore};
pub use revalidate::{Revalidator, SubmitError};
pub use search::{CacheStatus, SearchOutcome, SearchRequest, Timings};

use std::{future::Future, pin::Pin, sync::Arc};

use time::OffsetDateTime;

use pantry_config::{Config, GenerationProviderConfig, ImageProviderConfig};
use pantry_providers::{generation, image as image_provider};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		query: &'a str,
		filters: &'a [String],
	) -> BoxFuture<'a, pantry_providers::Result<String>>;
}

pub trait ImageProvider
where
	Self: Send + Sync,
{
	fn generate_image<'a>(
		&'a self,
		cfg: &'a ImageProviderConfig,
		description: &'a str,
	) -> BoxFuture<'a, pantry_providers::Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub generation: Arc<dyn GenerationProvider>,
	pub images: Arc<dyn ImageProvider>,
}

pub struct RecipeService {
	pub cfg: Arc<Config>,
	pub providers: Providers,
	pub governor: RateGovernor,
	pub cache: ResponseCache,
	pub image_quota: FixedWindowCounter,
	clock: Arc<dyn Clock>,
	revalidator: Arc<Revalidator>,
}

struct DefaultProviders;

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		query: &'a str,
		filters: &'a [String],
	) -> BoxFuture<'a, pantry_providers::Result<String>> {
		Box::pin(generation::generate(cfg, query, filters))
	}
}

impl ImageProvider for DefaultProviders {
	fn generate_image<'a>(
		&'a self,
		cfg: &'a ImageProviderConfig,
		description: &'a str,
	) -> BoxFuture<'a, pantry_providers::Result<String>> {
		Box::pin(image_provider::generate_image(cfg, description))
	}
}

impl Providers {
	pub fn new(generation: Arc<dyn GenerationProvider>, images: Arc<dyn ImageProvider>) -> Self {
		Self { generation, images }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { generation: provider.clone(), images: provider }
	}
}

impl RecipeService {
	/// Must be called from within a Tokio runtime; revalidation workers are spawned here.
	pub fn new(cfg: Config) -> Self {
		Self::with_parts(cfg, Providers::default(), Arc::new(SystemClock))
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		Self::with_parts(cfg, providers, Arc::new(SystemClock))
	}

	pub fn with_parts(cfg: Config, providers: Providers, clock: Arc<dyn Clock>) -> Self {
		let revalidator = Arc::new(Revalidator::spawn(&cfg.revalidation));
		let governor = RateGovernor::new(&cfg.rate_limit, clock.clone());
		let cache = ResponseCache::new(&cfg.cache, clock.clone(), revalidator.clone());
		let image_quota = FixedWindowCounter::new(&cfg.image, clock.clone());

		Self { cfg: Arc::new(cfg), providers, governor, cache, image_quota, clock, revalidator }
	}

	pub fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	/// Stops accepting background refreshes and waits for queued ones to finish.
	pub async fn shutdown(&self) {
		self.revalidator.shutdown().await;
	}
}
