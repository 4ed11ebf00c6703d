use serde::{Deserialize, Serialize};

use super::recipe::Recipe;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    pub with_recipe: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecipeRequest {
    pub ingredients: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub raw: String,
    pub recipe: Recipe,
}
