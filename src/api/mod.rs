mod chain;
mod health;
pub mod models;
mod tx;

use actix_web::HttpResponse;
use actix_web::web::{self, ServiceConfig};
use log::{error, warn};

use crate::error::LedgerError;
use models::MessageResponse;

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(tx::post_transaction)
            .service(tx::get_transaction)
            .service(tx::get_pending)
            .service(tx::delete_transaction)
            .service(chain::mine_block)
            .service(chain::get_blocks)
            .service(chain::validate_chain),
    );
}

/// Map a ledger error onto an HTTP response.
pub(crate) fn error_response(err: &LedgerError) -> HttpResponse {
    let body = MessageResponse {
        message: err.to_string(),
    };
    match err {
        LedgerError::Rejected(_) => {
            warn!("request rejected: {}", err);
            HttpResponse::UnprocessableEntity().json(body)
        }
        LedgerError::TransactionNotFound(_) => HttpResponse::NotFound().json(body),
        LedgerError::StaleSnapshot(_) | LedgerError::ContentionExhausted(_) => {
            warn!("ledger contention: {}", err);
            HttpResponse::Conflict().json(body)
        }
        LedgerError::Database(_) | LedgerError::Corrupt(_) | LedgerError::LockPoisoned => {
            error!("ledger failure: {}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LedgerStore, SqliteLedger};
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn state() -> (Arc<SqliteLedger>, web::Data<AppState>) {
        let store = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let state = web::Data::new(AppState::new(store.clone(), 3));
        (store, state)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(init_routes)).await
        };
    }

    #[actix_web::test]
    async fn health_is_up() {
        let (_, state) = state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/api/v1/health/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn submit_mine_validate_flow() {
        let (_, state) = state();
        let app = app!(state);

        for (s, r, a) in [("Alice", "Bob", json!(10.00)), ("Bob", "Carol", json!("5.00"))] {
            let req = test::TestRequest::post()
                .uri("/api/v1/transaction/")
                .set_json(json!({ "sender": s, "receiver": r, "amount": a }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["status"], "pending");
        }

        let req = test::TestRequest::get().uri("/api/v1/transactions/pending/").to_request();
        let pending: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending["size"], 2);

        let req = test::TestRequest::post().uri("/api/v1/block/mine/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let mined: Value = test::read_body_json(resp).await;
        assert_eq!(mined["mined"], true);
        assert_eq!(mined["block"]["index"], 1);
        assert_eq!(mined["block"]["previous_hash"], "0");
        assert!(mined["block"]["current_hash"].as_str().unwrap().starts_with("00"));
        assert_eq!(mined["block"]["transactions"][0]["amount"], "10.00");
        assert_eq!(mined["block"]["transactions"][1]["status"], "settled");

        let req = test::TestRequest::get().uri("/api/v1/blocks/").to_request();
        let chain: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(chain["length"], 1);

        let req = test::TestRequest::get().uri("/api/v1/blockchain/validate/").to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["valid"], true);
        assert!(report.get("violation").is_none());
    }

    #[actix_web::test]
    async fn mining_nothing_is_not_an_error() {
        let (store, state) = state();
        let app = app!(state);
        let req = test::TestRequest::post().uri("/api/v1/block/mine/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["mined"], false);
        assert!(store.tip().unwrap().is_none());
    }

    #[actix_web::test]
    async fn bad_submissions_are_rejected() {
        let (store, state) = state();
        let app = app!(state);
        for payload in [
            json!({ "sender": "Alice", "receiver": "Alice", "amount": 1 }),
            json!({ "sender": "Alice", "receiver": "Bob", "amount": 0 }),
            json!({ "sender": "Alice", "receiver": "Bob", "amount": -4 }),
            json!({ "sender": "Alice", "receiver": "Bob", "amount": "1.001" }),
            json!({ "sender": "Alice", "receiver": "Bob", "amount": "100000000000000000" }),
            json!({ "sender": "Alice", "amount": 1 }),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/v1/transaction/")
                .set_json(&payload)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{payload}");
        }
        assert!(store.pending_transactions().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn delete_guards_settled_transactions() {
        let (store, state) = state();
        let app = app!(state);

        let submit = |s: &str, r: &str| {
            let new = crate::transaction::NewTransaction::new(s, r, "1").unwrap();
            store
                .insert_transaction(&new, crate::blockchain::block::ledger_now())
                .unwrap()
        };
        let settled = submit("Alice", "Bob");
        state.miner.mine().unwrap();
        let pending = submit("Bob", "Carol");

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/transaction/{}/", settled.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/transaction/{}/", pending.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/transaction/{}/", pending.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete()
            .uri("/api/v1/transaction/9999/")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn validation_reports_tampered_block() {
        let (store, state) = state();
        let app = app!(state);
        for _ in 0..3 {
            let new = crate::transaction::NewTransaction::new("Alice", "Bob", "2").unwrap();
            store
                .insert_transaction(&new, crate::blockchain::block::ledger_now())
                .unwrap();
            state.miner.mine().unwrap();
        }
        store
            .execute_raw("UPDATE transactions SET amount_cents = 99900 WHERE block_index = 2")
            .unwrap();

        let req = test::TestRequest::get().uri("/api/v1/blockchain/validate/").to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["valid"], false);
        assert_eq!(report["violation"]["kind"], "integrity");
        assert_eq!(report["violation"]["index"], 2);
    }
}
