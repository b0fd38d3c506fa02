use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
	pub id: String,
	pub title: String,
	pub description: String,
	pub ingredients: Vec<String>,
	pub instructions: Vec<String>,
	pub prep_time: String,
	/// Set semantics, first-seen order.
	pub dietary_info: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub recipe_type: Option<String>,
}

/// A non-empty, ordered batch of recipes with unique ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SearchResultBatch(Vec<Recipe>);
impl SearchResultBatch {
	/// Returns `None` for an empty batch.
	pub fn new(recipes: Vec<Recipe>) -> Option<Self> {
		if recipes.is_empty() {
			return None;
		}

		Some(Self(recipes))
	}

	pub fn recipes(&self) -> &[Recipe] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn into_recipes(self) -> Vec<Recipe> {
		self.0
	}
}
