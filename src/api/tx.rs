use actix_web::{HttpResponse, Responder, delete, get, post, web};
use log::{debug, info, warn};
use std::time::Instant;

use super::error_response;
use super::models::{AppState, MessageResponse, NewTxRequest, PendingResponse};
use crate::blockchain::block::ledger_now;
use crate::transaction::NewTransaction;

/// Submit a new transfer. It is stored as `pending` until mined.
#[post("/transaction/")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<NewTxRequest>,
) -> impl Responder {
    let t0 = Instant::now();
    let amount = body.amount_text();
    debug!(
        "POST /transaction/ - received: sender={:?}, receiver={:?}, amount={:?}",
        body.sender, body.receiver, amount
    );

    let new = match NewTransaction::new(&body.sender, &body.receiver, &amount) {
        Ok(new) => new,
        Err(rejection) => {
            warn!("POST /transaction/ - rejected: {}", rejection);
            return HttpResponse::UnprocessableEntity().json(MessageResponse {
                message: rejection.to_string(),
            });
        }
    };

    match state.store.insert_transaction(&new, ledger_now()) {
        Ok(tx) => {
            info!(
                "POST /transaction/ - id={} {} -> {} ({}) OK ({} ms)",
                tx.id,
                tx.sender,
                tx.receiver,
                tx.amount,
                t0.elapsed().as_millis()
            );
            HttpResponse::Created().json(tx)
        }
        Err(e) => error_response(&e),
    }
}

#[get("/transaction/{id}/")]
pub async fn get_transaction(state: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    let id = path.into_inner();
    match state.store.transaction(id) {
        Ok(Some(tx)) => HttpResponse::Ok().json(tx),
        Ok(None) => HttpResponse::NotFound().json(MessageResponse {
            message: format!("transaction {id} not found"),
        }),
        Err(e) => error_response(&e),
    }
}

/// List pending transactions, oldest first.
#[get("/transactions/pending/")]
pub async fn get_pending(state: web::Data<AppState>) -> impl Responder {
    match state.store.pending_transactions() {
        Ok(transactions) => HttpResponse::Ok().json(PendingResponse {
            size: transactions.len(),
            transactions,
        }),
        Err(e) => error_response(&e),
    }
}

/// Withdraw a pending transaction. Settled ones are final.
#[delete("/transaction/{id}/")]
pub async fn delete_transaction(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> impl Responder {
    let id = path.into_inner();
    match state.store.withdraw_transaction(id) {
        Ok(tx) => {
            info!("DELETE /transaction/{}/ - withdrawn ({} -> {})", id, tx.sender, tx.receiver);
            HttpResponse::Ok().json(MessageResponse {
                message: "Pending transaction deleted successfully.".to_string(),
            })
        }
        Err(e) => error_response(&e),
    }
}
