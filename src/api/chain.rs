use actix_web::{HttpResponse, Responder, get, post, web};
use log::{error, info};

use super::error_response;
use super::models::{AppState, ChainResponse, MineResponse, ValidateResponse};
use crate::blockchain::{DIFFICULTY, MineOutcome, ValidationReport};

/// Get the full chain with each block's settled transactions.
#[get("/blocks/")]
pub async fn get_blocks(state: web::Data<AppState>) -> impl Responder {
    match state.store.chain() {
        Ok(chain) => HttpResponse::Ok().json(ChainResponse {
            length: chain.len(),
            difficulty: DIFFICULTY,
            chain,
        }),
        Err(e) => error_response(&e),
    }
}

/// Mine every pending transaction into a new block.
/// The nonce search runs on the blocking pool.
#[post("/block/mine/")]
pub async fn mine_block(state: web::Data<AppState>) -> impl Responder {
    let worker = state.clone();
    let outcome = match web::block(move || worker.miner.mine()).await {
        Ok(result) => result,
        Err(e) => {
            error!("MINER - blocking task failed: {}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };

    match outcome {
        Ok(MineOutcome::Mined(block)) => {
            info!(
                "MINER - sealed block #{} (hash={}, nonce={}, txs={:?})",
                block.index,
                block.current_hash,
                block.nonce,
                block.transaction_ids()
            );
            HttpResponse::Created().json(MineResponse {
                mined: true,
                message: format!("Block #{} mined.", block.index),
                block: Some(block),
            })
        }
        Ok(MineOutcome::NothingToMine) => {
            info!("MINER - no pending transactions");
            HttpResponse::Ok().json(MineResponse {
                mined: false,
                message: "No pending transactions to mine.".to_string(),
                block: None,
            })
        }
        Err(e) => error_response(&e),
    }
}

/// Validate the whole persisted chain.
#[get("/blockchain/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let worker = state.clone();
    let report = match web::block(move || worker.validator.validate()).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => return error_response(&e),
        Err(e) => {
            error!("VALIDATOR - blocking task failed: {}", e);
            return HttpResponse::InternalServerError().finish();
        }
    };

    log_report(&report);
    HttpResponse::Ok().json(ValidateResponse {
        valid: report.is_valid(),
        length: report.length(),
        difficulty: DIFFICULTY,
        message: if report.is_valid() {
            "Blockchain is secure and unmodified."
        } else {
            "Blockchain has been tampered with or is invalid."
        },
        reason: report.reason(),
        violation: report.violation().cloned(),
    })
}

fn log_report(report: &ValidationReport) {
    match report.violation() {
        None => info!("VALIDATOR - chain valid: {}", report.reason()),
        Some(v) => error!(
            "VALIDATOR - {} check failed at block #{}: expected={} actual={}",
            v.kind.as_str(),
            v.index,
            v.expected,
            v.actual
        ),
    }
}
