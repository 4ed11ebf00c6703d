use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use super::client::GenerativeModel;
use super::retry::{retry_with_backoff, RetryPolicy};
use crate::error::AppError;

const MAX_INGREDIENTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionFact {
    pub label: String,
    pub value: String,
}

/// Structured view of a generated recipe. Every field may be empty when the model strays
/// from the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recipe {
    pub name: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub servings: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub tips: Vec<String>,
    pub nutrition: Vec<NutritionFact>,
}

pub fn recipe_prompt(ingredients: &[String]) -> String {
    format!(
        "Create one recipe that uses these ingredients: {}.\n\
You may assume common pantry staples (salt, pepper, oil, water).\n\
Reply using exactly this template and nothing else:\n\
Recipe Name: <name>\n\
Prep Time: <duration>\n\
Cook Time: <duration>\n\
Servings: <number>\n\
Ingredients:\n\
- <quantity> <ingredient>\n\
Instructions:\n\
1. <step>\n\
Tips:\n\
- <tip>\n\
Nutrition Facts (per serving):\n\
- Calories: <value>\n\
- Protein: <value>\n\
- Carbohydrates: <value>\n\
- Fat: <value>",
        ingredients.join(", ")
    )
}

/// Asks the model for a recipe; the raw text is returned for [`parse_recipe`].
pub async fn generate_recipe(
    model: &dyn GenerativeModel,
    policy: &RetryPolicy,
    ingredients: &[String],
) -> Result<String, AppError> {
    let ingredients: Vec<String> = ingredients
        .iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();
    if ingredients.is_empty() {
        return Err(AppError::invalid("at least one ingredient is required"));
    }
    if ingredients.len() > MAX_INGREDIENTS {
        return Err(AppError::invalid("too many ingredients"));
    }

    let prompt = recipe_prompt(&ingredients);
    let prompt = prompt.as_str();
    let text = retry_with_backoff(policy, move || model.generate(prompt, None)).await?;
    info!(ingredients = ingredients.len(), chars = text.len(), "recipe generated");
    Ok(text)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Ingredients,
    Instructions,
    Tips,
    Nutrition,
}

lazy_static! {
    static ref LIST_MARKER_RE: Regex = Regex::new(r"^(?:\d+[.)]|[-*•])\s+").unwrap();
    static ref FIELD_RE: Regex = Regex::new(r"^([A-Za-z][A-Za-z ()/]{0,40}?)\s*:\s*(.*)$").unwrap();
}

fn clean(line: &str) -> String {
    line.replace("**", "")
        .trim()
        .trim_start_matches('#')
        .trim()
        .to_string()
}

fn non_empty(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Extracts template sections line by line. Unknown lines attach to the current section;
/// nothing here fails.
pub fn parse_recipe(text: &str) -> Recipe {
    let mut recipe = Recipe::default();
    let mut section = Section::None;

    for raw in text.lines() {
        let line = clean(raw);
        if line.is_empty() {
            continue;
        }
        let is_item = LIST_MARKER_RE.is_match(&line);
        let body = LIST_MARKER_RE.replace(&line, "").trim().to_string();

        if let Some(caps) = FIELD_RE.captures(&body) {
            let key = caps[1].trim().to_lowercase();
            let value = caps[2].trim();

            if !is_item {
                let header = if key == "name" || key == "title" || key.starts_with("recipe name") {
                    recipe.name = non_empty(value);
                    true
                } else if key.starts_with("prep") {
                    recipe.prep_time = non_empty(value);
                    true
                } else if key.starts_with("cook") && key.contains("time") {
                    recipe.cook_time = non_empty(value);
                    true
                } else if key.starts_with("serving") || key == "serves" || key == "yield" {
                    recipe.servings = non_empty(value);
                    true
                } else if let Some(next) = section_for(&key) {
                    section = next;
                    if let Some(v) = non_empty(value) {
                        push_item(&mut recipe, section, &v);
                    }
                    true
                } else {
                    false
                };
                if header {
                    continue;
                }
            }

            if section == Section::Nutrition {
                recipe.nutrition.push(NutritionFact {
                    label: caps[1].trim().to_string(),
                    value: value.to_string(),
                });
                continue;
            }
        }

        push_item(&mut recipe, section, &body);
    }

    recipe
}

fn section_for(key: &str) -> Option<Section> {
    if key.starts_with("ingredient") {
        Some(Section::Ingredients)
    } else if key.starts_with("instruction")
        || key.starts_with("direction")
        || key.starts_with("method")
        || key == "steps"
    {
        Some(Section::Instructions)
    } else if key.starts_with("tip") || key.starts_with("chef") {
        Some(Section::Tips)
    } else if key.starts_with("nutrition") {
        Some(Section::Nutrition)
    } else {
        None
    }
}

fn push_item(recipe: &mut Recipe, section: Section, item: &str) {
    let item = item.to_string();
    match section {
        Section::Ingredients => recipe.ingredients.push(item),
        Section::Instructions => recipe.instructions.push(item),
        Section::Tips => recipe.tips.push(item),
        // free text in nutrition without a label
        Section::Nutrition => recipe.nutrition.push(NutritionFact {
            label: item,
            value: String::new(),
        }),
        Section::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::fake::ScriptedModel;

    const SAMPLE: &str = "\
**Recipe Name:** Tomato Basil Pasta
Prep Time: 10 minutes
Cook Time: 20 minutes
Servings: 4

Ingredients:
- 400g spaghetti
- 4 tomatoes, diced
- Salt: to taste

Instructions:
1. Boil the pasta in salted water.
2. Simmer tomatoes with olive oil.
3) Toss together and serve.

Tips:
- Use ripe tomatoes.

Nutrition Facts (per serving):
- Calories: 420
- Protein: 14g
";

    #[test]
    fn parses_full_template() {
        let r = parse_recipe(SAMPLE);
        assert_eq!(r.name.as_deref(), Some("Tomato Basil Pasta"));
        assert_eq!(r.prep_time.as_deref(), Some("10 minutes"));
        assert_eq!(r.cook_time.as_deref(), Some("20 minutes"));
        assert_eq!(r.servings.as_deref(), Some("4"));
        assert_eq!(
            r.ingredients,
            vec!["400g spaghetti", "4 tomatoes, diced", "Salt: to taste"]
        );
        assert_eq!(
            r.instructions,
            vec![
                "Boil the pasta in salted water.",
                "Simmer tomatoes with olive oil.",
                "Toss together and serve."
            ]
        );
        assert_eq!(r.tips, vec!["Use ripe tomatoes."]);
        assert_eq!(
            r.nutrition,
            vec![
                NutritionFact {
                    label: "Calories".into(),
                    value: "420".into()
                },
                NutritionFact {
                    label: "Protein".into(),
                    value: "14g".into()
                },
            ]
        );
    }

    #[test]
    fn malformed_output_degrades_to_empty_sections() {
        let r = parse_recipe("Sorry, I can't help with that.");
        assert_eq!(r, Recipe::default());

        let partial = parse_recipe("Recipe Name: Toast\nInstructions:\n1. Toast bread");
        assert_eq!(partial.name.as_deref(), Some("Toast"));
        assert!(partial.ingredients.is_empty());
        assert_eq!(partial.instructions, vec!["Toast bread"]);
    }

    #[tokio::test]
    async fn empty_ingredient_list_is_rejected_before_calling_model() {
        let model = ScriptedModel::replying(SAMPLE);
        let err = generate_recipe(&model, &RetryPolicy::default(), &["  ".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn returns_raw_model_text() {
        let model = ScriptedModel::replying(SAMPLE);
        let text = generate_recipe(&model, &RetryPolicy::default(), &["tomato".to_string()])
            .await
            .unwrap();
        assert_eq!(text, SAMPLE);
    }

    #[test]
    fn prompt_lists_ingredients_and_template() {
        let p = recipe_prompt(&["eggs".into(), "leeks".into()]);
        assert!(p.contains("eggs, leeks"));
        assert!(p.contains("Nutrition Facts"));
        assert!(p.contains("1. <step>"));
    }
}
