use std::sync::Arc;

use pantry_service::RecipeService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RecipeService>,
}
impl AppState {
	/// Must be called from within a Tokio runtime.
	pub fn new(config: pantry_config::Config) -> Self {
		Self::from_service(Arc::new(RecipeService::new(config)))
	}

	pub fn from_service(service: Arc<RecipeService>) -> Self {
		Self { service }
	}
}
