//! Scriptable in-process [`PaymentGateway`] for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use atelier_core::CurrencyCode;

use super::{PaymentError, PaymentGateway, PaymentIntent, PaymentIntentStatus};

#[derive(Default)]
struct FakeState {
    next_id: u32,
    intents: HashMap<String, PaymentIntent>,
    fail_next: Option<PaymentError>,
    created: usize,
}

/// Payment gateway double.
///
/// Created intents start out `succeeded`, as if the browser had confirmed
/// them straight away. Tests can change an intent's status or make the next
/// call fail.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    /// Create a gateway with no intents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent directly, bypassing `create_intent`.
    pub fn insert_intent(&self, id: &str, amount_minor: i64, status: PaymentIntentStatus) {
        self.state.lock().intents.insert(
            id.to_owned(),
            PaymentIntent {
                id: id.to_owned(),
                client_secret: Some(format!("{id}_secret")),
                amount: amount_minor,
                currency: CurrencyCode::USD.as_lower().to_owned(),
                status,
            },
        );
    }

    /// Change the status of a known intent.
    pub fn set_status(&self, id: &str, status: PaymentIntentStatus) {
        if let Some(intent) = self.state.lock().intents.get_mut(id) {
            intent.status = status;
        }
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: PaymentError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Number of intents created through `create_intent`.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.state.lock().created
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        state.next_id += 1;
        state.created += 1;
        let id = format!("pi_fake_{}", state.next_id);
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            amount: amount_minor,
            currency: currency.as_lower().to_owned(),
            status: PaymentIntentStatus::Succeeded,
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, payment_id: &str) -> Result<PaymentIntent, PaymentError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        state
            .intents
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(payment_id.to_owned()))
    }
}
