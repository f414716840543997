//! PostgreSQL store tests
//!
//! Ignored by default. Run against a scratch database with:
//! `DATABASE_URL=postgres://localhost/stock_transfer_test cargo test --test postgres_tests -- --ignored`
//!
//! Every test binds a fresh tenant, so runs never see each other's rows.

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::{
    CreateLocationInput, CreateTransferInput, DiscrepancyKind, MovementReason, ReceiveLineInput,
    ReceiveTransferInput, Transfer, TransferAction, TransferLineInput, TransferState,
    UpdateTransferInput,
};
use sqlx::postgres::PgPoolOptions;
use stock_transfer::config::TransferConfig;
use stock_transfer::error::AppError;
use stock_transfer::services::{LocationService, StockLedger, TransferService};
use stock_transfer::store::{InventoryStore, PgInventoryStore, Transition};
use stock_transfer::tenant::TenantScope;
use uuid::Uuid;

fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

struct PgFixture {
    store: Arc<dyn InventoryStore>,
    transfers: TransferService,
    ledger: StockLedger,
    scope: TenantScope,
    origin: Uuid,
    destination: Uuid,
}

impl PgFixture {
    /// `None` when no database is configured
    async fn new() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping");
            return None;
        };
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .unwrap();
        let pg = PgInventoryStore::new(pool, 2000);
        pg.run_migrations().await.unwrap();
        let store: Arc<dyn InventoryStore> = Arc::new(pg);

        let scope = TenantScope::bind(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let locations = LocationService::new(store.clone());
        let origin = locations
            .create(&scope, CreateLocationInput { name: "Bodega Central".to_string() })
            .await
            .unwrap()
            .id;
        let destination = locations
            .create(&scope, CreateLocationInput { name: "Sucursal Norte".to_string() })
            .await
            .unwrap()
            .id;
        let config = TransferConfig {
            code_prefix: "TR".to_string(),
        };

        Some(Self {
            transfers: TransferService::new(store.clone(), &config),
            ledger: StockLedger::new(store.clone()),
            store,
            scope,
            origin,
            destination,
        })
    }

    async fn stock(&self, location_id: Uuid, product_id: Uuid, quantity: Decimal) {
        self.ledger
            .apply_delta(
                &self.scope,
                location_id,
                product_id,
                quantity,
                MovementReason::Adjustment,
                Uuid::new_v4(),
            )
            .await
            .unwrap();
    }

    async fn on_hand(&self, location_id: Uuid, product_id: Uuid) -> Decimal {
        self.ledger
            .balance(&self.scope, location_id, product_id)
            .await
            .unwrap()
            .quantity_on_hand
    }

    fn input(&self, origin: Uuid, destination: Uuid, lines: &[(Uuid, Decimal)]) -> CreateTransferInput {
        CreateTransferInput {
            origin_location_id: origin,
            destination_location_id: destination,
            lines: lines
                .iter()
                .map(|(product_id, quantity)| TransferLineInput {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
            notes: None,
        }
    }

    async fn draft(&self, lines: &[(Uuid, Decimal)]) -> Transfer {
        self.transfers
            .create(&self.scope, self.input(self.origin, self.destination, lines))
            .await
            .unwrap()
    }
}

// ============================================================================
// Lifecycle Scenarios
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_pg_dispatch_then_receive_in_full() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    fx.stock(fx.origin, product, dec(10)).await;
    let draft = fx.draft(&[(product, dec(4))]).await;

    let dispatched = fx.transfers.dispatch(&fx.scope, draft.id).await.unwrap();
    assert_eq!(dispatched.state, TransferState::Dispatched);
    assert_eq!(fx.on_hand(fx.origin, product).await, dec(6));

    let receipt = fx
        .transfers
        .receive(&fx.scope, draft.id, ReceiveTransferInput::default())
        .await
        .unwrap();

    assert_eq!(receipt.transfer.state, TransferState::Received);
    assert!(receipt.summary.is_clean());
    assert_eq!(fx.on_hand(fx.destination, product).await, dec(4));
    let movements = fx.ledger.movements(&fx.scope, fx.origin, Some(product)).await.unwrap();
    assert_eq!(movements[0].reason, MovementReason::TransferDispatch);
    assert_eq!(movements[0].balance_after, dec(6));
}

#[tokio::test]
#[ignore]
async fn test_pg_short_receipt_records_shortage() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    fx.stock(fx.origin, product, dec(10)).await;
    let draft = fx.draft(&[(product, dec(10))]).await;
    let dispatched = fx.transfers.dispatch(&fx.scope, draft.id).await.unwrap();

    let input = ReceiveTransferInput {
        lines: vec![ReceiveLineInput {
            line_id: dispatched.lines[0].id,
            quantity_received: dec(8),
        }],
        notes: Some("dos unidades dañadas".to_string()),
    };
    let receipt = fx.transfers.receive(&fx.scope, draft.id, input).await.unwrap();

    assert_eq!(fx.on_hand(fx.destination, product).await, dec(8));
    let discrepancy = receipt.transfer.lines[0].discrepancy.unwrap();
    assert_eq!(discrepancy.kind, DiscrepancyKind::Shortage);
    assert_eq!(discrepancy.quantity, dec(2));

    let history = fx.transfers.history(&fx.scope, draft.id).await.unwrap();
    let received = history.last().unwrap();
    assert_eq!(received.to_state, TransferState::Received);
    assert_eq!(received.discrepancies.len(), 1);
    assert_eq!(received.notes.as_deref(), Some("dos unidades dañadas"));
}

#[tokio::test]
#[ignore]
async fn test_pg_insufficient_stock_rolls_back_dispatch() {
    let Some(fx) = PgFixture::new().await else { return };
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    fx.stock(fx.origin, a, dec(5)).await;
    fx.stock(fx.origin, b, dec(1)).await;
    let draft = fx.draft(&[(a, dec(5)), (b, dec(3))]).await;

    let result = fx.transfers.dispatch(&fx.scope, draft.id).await;

    assert!(matches!(result, Err(AppError::InsufficientStock { ref shortfalls }) if shortfalls.len() == 1));
    assert_eq!(fx.on_hand(fx.origin, a).await, dec(5));
    assert_eq!(fx.on_hand(fx.origin, b).await, dec(1));
    let reloaded = fx.transfers.get(&fx.scope, draft.id).await.unwrap();
    assert_eq!(reloaded.state, TransferState::Draft);
    assert_eq!(fx.ledger.movements(&fx.scope, fx.origin, Some(a)).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_pg_cancel_after_dispatch_restores_origin() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    fx.stock(fx.origin, product, dec(7)).await;
    let draft = fx.draft(&[(product, dec(7))]).await;
    fx.transfers.dispatch(&fx.scope, draft.id).await.unwrap();
    assert_eq!(fx.on_hand(fx.origin, product).await, dec(0));

    let cancelled = fx
        .transfers
        .cancel(&fx.scope, draft.id, Some("camión averiado".to_string()))
        .await
        .unwrap();

    assert_eq!(cancelled.state, TransferState::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(fx.on_hand(fx.origin, product).await, dec(7));
    assert_eq!(fx.on_hand(fx.destination, product).await, dec(0));
}

#[tokio::test]
#[ignore]
async fn test_pg_receive_on_draft_is_rejected() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    let draft = fx.draft(&[(product, dec(1))]).await;

    let result = fx
        .transfers
        .receive(&fx.scope, draft.id, ReceiveTransferInput::default())
        .await;

    assert!(matches!(
        result,
        Err(AppError::InvalidState { current: TransferState::Draft, .. })
    ));
}

#[tokio::test]
#[ignore]
async fn test_pg_same_location_is_rejected_and_not_persisted() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();

    let result = fx
        .transfers
        .create(&fx.scope, fx.input(fx.origin, fx.origin, &[(product, dec(1))]))
        .await;

    assert!(matches!(result, Err(AppError::Validation { .. })));
    let page = fx
        .transfers
        .list(&fx.scope, Default::default(), Default::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 0);
}

// ============================================================================
// Guards and Concurrency
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_pg_stale_dispatch_after_edit_is_a_conflict() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    fx.stock(fx.origin, product, dec(10)).await;
    let stale = fx.draft(&[(product, dec(2))]).await;

    fx.transfers
        .update_draft(
            &fx.scope,
            stale.id,
            UpdateTransferInput {
                lines: Some(vec![TransferLineInput { product_id: product, quantity: dec(5) }]),
                notes: None,
            },
        )
        .await
        .unwrap();

    let transition = Transition::new(&stale, TransferAction::Dispatch, MovementReason::TransferDispatch).unwrap();
    let result = fx.store.apply_transition(&fx.scope, transition).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(fx.on_hand(fx.origin, product).await, dec(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_pg_concurrent_dispatches_share_stock_safely() {
    let Some(fx) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    fx.stock(fx.origin, product, dec(10)).await;
    let first = fx.draft(&[(product, dec(6))]).await;
    let second = fx.draft(&[(product, dec(6))]).await;

    let (s1, s2) = (fx.transfers.clone(), fx.transfers.clone());
    let scope = fx.scope;
    let a = tokio::spawn(async move { s1.dispatch(&scope, first.id).await });
    let b = tokio::spawn(async move { s2.dispatch(&scope, second.id).await });
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::InsufficientStock { .. }))));
    assert_eq!(fx.on_hand(fx.origin, product).await, dec(4));
}

#[tokio::test]
#[ignore]
async fn test_pg_other_tenant_sees_not_found() {
    let Some(fx) = PgFixture::new().await else { return };
    let Some(other) = PgFixture::new().await else { return };
    let product = Uuid::new_v4();
    let draft = fx.draft(&[(product, dec(1))]).await;

    let get = other.transfers.get(&other.scope, draft.id).await;
    let by_code = other.transfers.get_by_code(&other.scope, &draft.code).await;
    let cancel = other.transfers.cancel(&other.scope, draft.id, None).await;

    assert!(matches!(get, Err(AppError::NotFound(_))));
    assert!(matches!(by_code, Err(AppError::NotFound(_))));
    assert!(matches!(cancel, Err(AppError::NotFound(_))));
    // Codes restart per tenant
    assert_eq!(other.draft(&[(product, dec(1))]).await.code, draft.code);
}
