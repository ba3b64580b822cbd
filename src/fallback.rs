use crate::models::{CarEntry, LlmResponse};
use rand::Rng;

/// Picks an index in `0..len`. Must return a value below `len`.
pub type PickFn = Box<dyn Fn(usize) -> usize + Send + Sync>;

/// Substitute responses served while the text provider is out of quota.
///
/// The catalog holds exactly one pre-authored response per tag.
pub struct FallbackSelector {
    catalog: Vec<LlmResponse>,
    pick: PickFn,
}

impl FallbackSelector {
    /// Uniform random selection over the built-in catalog.
    pub fn new() -> Self {
        Self::with_picker(Box::new(|len| rand::thread_rng().gen_range(0..len)))
    }

    /// Deterministic selection for tests.
    pub fn with_picker(pick: PickFn) -> Self {
        Self {
            catalog: default_catalog(),
            pick,
        }
    }

    pub fn catalog(&self) -> &[LlmResponse] {
        &self.catalog
    }

    pub fn select(&self) -> LlmResponse {
        let len = self.catalog.len();
        // Clamp so a misbehaving picker cannot index out of bounds.
        let index = (self.pick)(len).min(len - 1);
        let response = self.catalog[index].clone();
        tracing::info!("Serving fallback {} response", response.response_type());
        response
    }
}

impl Default for FallbackSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn default_catalog() -> Vec<LlmResponse> {
    vec![
        LlmResponse::CarRecommendations {
            reply: "Here are some mocked car recommendations while the AI service is unavailable."
                .to_string(),
            cars: vec![
                CarEntry {
                    id: "mock-1".to_string(),
                    name: "Toyota Camry".to_string(),
                    price: 20_400_000,
                    color: "silver".to_string(),
                },
                CarEntry {
                    id: "mock-2".to_string(),
                    name: "Honda CR-V".to_string(),
                    price: 25_500_000,
                    color: "red".to_string(),
                },
            ],
        },
        LlmResponse::Advice {
            reply: "Our AI assistant is busy right now, but here are a few tips for buying a car."
                .to_string(),
            advice: Some(vec![
                "Set a total budget that includes registration and insurance.".to_string(),
                "Ask for the full service history and check the VIN.".to_string(),
                "Always take a test drive before paying a deposit.".to_string(),
            ]),
        },
        LlmResponse::Clarification {
            reply: "Our AI assistant is busy right now. Tell us a bit more so we can help when it is back."
                .to_string(),
            questions: Some(vec![
                "What is your budget?".to_string(),
                "Do you prefer a sedan, SUV or pickup?".to_string(),
                "Which city are you buying in?".to_string(),
            ]),
        },
        LlmResponse::General {
            reply: "Our AI assistant is temporarily unavailable. Please try again in a few minutes."
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseType;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_has_one_entry_per_tag() {
        let selector = FallbackSelector::new();
        let tags: HashSet<_> = selector
            .catalog()
            .iter()
            .map(|r| r.response_type())
            .collect();
        assert_eq!(selector.catalog().len(), ResponseType::ALL.len());
        assert_eq!(tags.len(), ResponseType::ALL.len());
    }

    #[test]
    fn test_catalog_entries_are_valid() {
        for response in FallbackSelector::new().catalog() {
            assert!(!response.reply().trim().is_empty());
            if let LlmResponse::CarRecommendations { cars, .. } = response {
                assert!(!cars.is_empty());
                assert!(cars.iter().all(|c| c.price > 0));
            }
        }
    }

    #[test]
    fn test_injected_picker_is_deterministic() {
        let selector = FallbackSelector::with_picker(Box::new(|_| 3));
        assert_eq!(selector.select().response_type(), ResponseType::General);
        assert_eq!(selector.select().response_type(), ResponseType::General);
    }

    #[test]
    fn test_out_of_range_pick_is_clamped() {
        let selector = FallbackSelector::with_picker(Box::new(|len| len + 10));
        assert_eq!(selector.select().response_type(), ResponseType::General);
    }

    #[test]
    fn test_random_selection_stays_in_catalog() {
        let selector = FallbackSelector::new();
        for _ in 0..50 {
            let picked = selector.select();
            assert!(selector.catalog().contains(&picked));
        }
    }
}
