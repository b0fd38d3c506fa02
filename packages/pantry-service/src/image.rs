use serde::Deserialize;

use crate::{Error, RecipeService, Result, rate::RateDecision};

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
	pub description: String,
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
	pub url: String,
	pub rate: RateDecision,
}

impl RecipeService {
	/// Generates one illustration. Admission is a single process-wide window, not per client.
	pub async fn generate_image(&self, req: ImageRequest) -> Result<ImageOutcome> {
		let description = req.description.trim();

		if description.is_empty() {
			return Err(Error::InvalidRequest {
				field: "description",
				message: "description must be non-empty.".to_string(),
			});
		}
		if description.chars().count() > self.cfg.image.max_description_chars {
			return Err(Error::InvalidRequest {
				field: "description",
				message: format!(
					"description must be at most {} characters.",
					self.cfg.image.max_description_chars
				),
			});
		}

		let rate = self.image_quota.acquire();

		if !rate.allowed {
			tracing::info!(reset_at = %rate.reset_at, "Image generation rejected by quota.");

			return Err(Error::RateLimited { decision: rate });
		}

		let url = self
			.providers
			.images
			.generate_image(&self.cfg.providers.image, description)
			.await
			.map_err(|err| {
				let err = Error::from(err);

				match &err {
					Error::Configuration { message } =>
						tracing::error!(error = %message, "Image provider is not configured."),
					other => tracing::warn!(error = %other, "Image generation failed."),
				}

				err
			})?;

		tracing::info!(remaining = rate.remaining, "Image generated.");

		Ok(ImageOutcome { url, rate })
	}
}
