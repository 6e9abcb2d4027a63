use crate::methods::reconciler::ReconcileOutcome;
use crate::model::PaymentEventKind;
use crate::{STORE, methods};
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use warp::{Filter, http::StatusCode};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PaymentEventBody {
    provider_event_id: String,
    booking_ref: String,
    kind: PaymentEventKind,
    amount: f64,
}

/// Payment provider callback. Every well-formed event gets a 200 so the
/// provider stops retrying; events this service cannot apply are shelved
/// for manual reconciliation instead of bounced.
pub fn main() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("payment")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and_then(async move |body: PaymentEventBody| {
            if body.provider_event_id.is_empty() {
                return methods::standard_replies::bad_request(
                    "The provider event id must not be empty.",
                );
            }

            let store = STORE.clone();
            let result = tokio::task::spawn_blocking(move || {
                methods::reconciler::apply_payment_event(
                    &*store,
                    &body.provider_event_id,
                    &body.booking_ref,
                    body.kind,
                    body.amount,
                )
            })
            .await;

            match result {
                Err(join_err) => methods::standard_replies::internal_server_error_response(
                    format!("webhook/payment: {}", join_err),
                ),
                Ok(Err(err)) => methods::standard_replies::internal_server_error_response(
                    format!("webhook/payment: {}", err),
                ),
                Ok(Ok(ReconcileOutcome::Applied(booking))) => {
                    methods::standard_replies::response_with_obj(
                        json!({
                            "outcome": "applied",
                            "booking": booking.to_publish_booking(),
                        }),
                        StatusCode::OK,
                    )
                }
                Ok(Ok(ReconcileOutcome::Duplicate)) => {
                    methods::standard_replies::response_with_obj(
                        json!({ "outcome": "duplicate" }),
                        StatusCode::OK,
                    )
                }
                Ok(Ok(ReconcileOutcome::Unmatched(note))) => {
                    methods::standard_replies::response_with_obj(
                        json!({ "outcome": "unmatched", "note": note }),
                        StatusCode::OK,
                    )
                }
            }
        })
}
