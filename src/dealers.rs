//! Dealer assignment for recommended cars.

use crate::models::{ChatResponse, Dealer, LlmResponse, Recommendation, ResponsePayload};

/// Confidence reported on every chat response.
pub const CONFIDENCE: f64 = 0.9;

/// Fixed dealer pool, assigned round-robin by position.
pub const DEALERS: [(&str, &str); 2] = [
    ("AutoHub Lagos", "sales@autohub.ng"),
    ("Prime Motors", "info@primemotors.ng"),
];

/// Dealer for the car at `index` in a recommendation list.
pub fn dealer_for(index: usize) -> Dealer {
    let (name, email) = DEALERS[index % DEALERS.len()];
    Dealer {
        name: name.to_string(),
        email: email.to_string(),
    }
}

/// Turn a provider response into the caller-facing shape.
///
/// Car entries keep their order and gain a dealer; other tags pass their
/// payload through untouched.
pub fn attach_dealers(response: LlmResponse) -> ChatResponse {
    let (reply, payload) = match response {
        LlmResponse::CarRecommendations { reply, cars } => {
            let recommendations = cars
                .into_iter()
                .enumerate()
                .map(|(index, car)| Recommendation {
                    id: car.id,
                    name: car.name,
                    price: car.price,
                    color: car.color,
                    dealer: dealer_for(index),
                })
                .collect();
            (reply, ResponsePayload::CarRecommendations { recommendations })
        }
        LlmResponse::Advice { reply, advice } => (reply, ResponsePayload::Advice { advice }),
        LlmResponse::Clarification { reply, questions } => {
            (reply, ResponsePayload::Clarification { questions })
        }
        LlmResponse::General { reply } => (reply, ResponsePayload::General),
    };

    ChatResponse {
        reply,
        payload,
        confidence: CONFIDENCE,
    }
}
