pub mod carts;
pub mod health;
pub mod identity;
pub mod orders;
pub mod pharmacist;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::cache::CacheBackend;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::message_queue::DelayedBroker;
use crate::services::{
    addresses::{AddressDirectory, DbAddressDirectory},
    cancellation::CancellationService,
    cart::CartService,
    cart_snapshot::CartSnapshotStore,
    checkout::CheckoutOrchestrator,
    delivery_quotes::DeliveryQuoteCache,
    order_status::{OrderStatusService, StatusDelays},
    orders::OrderService,
    payment_proof::{LocalProofStorage, ProofStorage},
    scheduler::DelayedStatusScheduler,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: CartService,
    pub checkout: CheckoutOrchestrator,
    pub order_status: OrderStatusService,
    pub cancellation: CancellationService,
    pub orders: OrderService,
    pub scheduler: DelayedStatusScheduler,
    /// Quotes are written by the delivery pricing flow and read at checkout
    pub quotes: DeliveryQuoteCache,
}

impl AppServices {
    /// Wires every service against one database, cache and broker.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        cache: Arc<dyn CacheBackend>,
        broker: Arc<dyn DelayedBroker>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let proofs: Arc<dyn ProofStorage> = Arc::new(LocalProofStorage::new(
            config.payment_proof_dir.clone(),
            config.max_payment_proof_bytes,
        ));
        Self::with_parts(
            db.clone(),
            config,
            cache,
            broker,
            event_sender,
            Arc::new(DbAddressDirectory::new(db)),
            proofs,
        )
    }

    /// Like [`AppServices::new`] with explicit address and proof backends.
    pub fn with_parts(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        cache: Arc<dyn CacheBackend>,
        broker: Arc<dyn DelayedBroker>,
        event_sender: Arc<EventSender>,
        addresses: Arc<dyn AddressDirectory>,
        proofs: Arc<dyn ProofStorage>,
    ) -> Self {
        let snapshots = CartSnapshotStore::new(cache.clone(), config.snapshot_ttl());
        let quotes = DeliveryQuoteCache::new(cache, config.delivery_quote_ttl());
        let scheduler = DelayedStatusScheduler::new(broker);

        let cart = CartService::new(db.clone(), snapshots.clone());
        let checkout = CheckoutOrchestrator::new(
            db.clone(),
            snapshots,
            quotes.clone(),
            addresses,
            event_sender.clone(),
        );
        let order_status = OrderStatusService::new(
            db.clone(),
            scheduler.clone(),
            proofs,
            event_sender.clone(),
            StatusDelays {
                payment_confirmation: config.payment_confirmation_delay(),
                shipment_completion: config.shipment_completion_delay(),
            },
        );
        let cancellation = CancellationService::new(db.clone(), event_sender);
        let orders = OrderService::new(db);

        Self {
            cart,
            checkout,
            order_status,
            cancellation,
            orders,
            scheduler,
            quotes,
        }
    }
}
