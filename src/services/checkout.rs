use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::cart_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{NewLineItem, NewOrderDetail, OrderRepository};
use crate::services::addresses::AddressDirectory;
use crate::services::cart_snapshot::{CartSnapshot, CartSnapshotStore, PharmacyGroup};
use crate::services::delivery_quotes::DeliveryQuoteCache;
use crate::services::rollback;
use crate::services::stock_ledger::StockLedger;

/// Delivery option chosen for one pharmacy group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeliverySelection {
    pub pharmacy_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub option_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub snapshot_id: Uuid,
    #[validate]
    pub deliveries: Vec<DeliverySelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    #[schema(value_type = String, example = "59000.00")]
    pub total_price: Decimal,
    pub order_detail_ids: Vec<Uuid>,
}

/// A snapshot group paired with its resolved delivery
struct PricedGroup<'a> {
    detail: NewOrderDetail,
    group: &'a PharmacyGroup,
}

/// Converts a cart snapshot into an order in one relational transaction
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    db: Arc<DatabaseConnection>,
    orders: OrderRepository,
    ledger: StockLedger,
    snapshots: CartSnapshotStore,
    quotes: DeliveryQuoteCache,
    addresses: Arc<dyn AddressDirectory>,
    event_sender: Arc<EventSender>,
}

impl CheckoutOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        snapshots: CartSnapshotStore,
        quotes: DeliveryQuoteCache,
        addresses: Arc<dyn AddressDirectory>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            ledger: StockLedger::new(),
            db,
            snapshots,
            quotes,
            addresses,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(snapshot_id = %request.snapshot_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, ServiceError> {
        request.validate()?;

        let address = self
            .addresses
            .active_address(user_id)
            .await?
            .ok_or(ServiceError::NoActiveAddress)?;

        let snapshot = self.snapshots.get(user_id, request.snapshot_id).await?;

        let priced = self
            .resolve_deliveries(user_id, &address.postal_code, &snapshot, &request.deliveries)
            .await?;

        let total_price = snapshot.items_total()
            + priced.iter().map(|p| p.detail.delivery_fee).sum::<Decimal>();

        let txn = self.db.begin().await?;
        let order_id = match self.write_order(&txn, user_id, total_price, &priced).await {
            Ok(order_id) => order_id,
            Err(e) => {
                rollback(txn).await;
                counter!("pharmacy_orders.checkouts", 1, "result" => "rejected");
                return Err(e);
            }
        };
        txn.commit().await?;

        // The order is durable from here on; a stale snapshot only fails later
        // checkouts on the cart line check.
        if let Err(e) = self.snapshots.delete(user_id, snapshot.id).await {
            warn!(error = %e, "Failed to delete cart snapshot after checkout");
        }

        let order_detail_ids: Vec<Uuid> = priced.iter().map(|p| p.detail.id).collect();

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                user_id,
                total_price,
                order_detail_ids: order_detail_ids.clone(),
            })
            .await;
        counter!("pharmacy_orders.checkouts", 1, "result" => "committed");
        info!(%order_id, %total_price, details = order_detail_ids.len(), "Checkout committed");

        Ok(CheckoutReceipt {
            order_id,
            total_price,
            order_detail_ids,
        })
    }

    /// Pairs every snapshot group with exactly one cached delivery quote.
    async fn resolve_deliveries<'a>(
        &self,
        user_id: Uuid,
        postal_code: &str,
        snapshot: &'a CartSnapshot,
        selections: &[DeliverySelection],
    ) -> Result<Vec<PricedGroup<'a>>, ServiceError> {
        if selections.len() != snapshot.groups.len() {
            return Err(ServiceError::InvalidDeliveryData(format!(
                "{} pharmacy groups but {} delivery selections",
                snapshot.groups.len(),
                selections.len()
            )));
        }

        let mut seen = HashSet::new();
        for selection in selections {
            if !seen.insert(selection.pharmacy_id) {
                return Err(ServiceError::InvalidDeliveryData(format!(
                    "pharmacy {} selected more than once",
                    selection.pharmacy_id
                )));
            }
            if snapshot.group(selection.pharmacy_id).is_none() {
                return Err(ServiceError::InvalidDeliveryData(format!(
                    "pharmacy {} is not part of the cart",
                    selection.pharmacy_id
                )));
            }
        }

        let mut priced = Vec::with_capacity(snapshot.groups.len());
        for group in &snapshot.groups {
            let selection = selections
                .iter()
                .find(|s| s.pharmacy_id == group.pharmacy_id)
                .ok_or_else(|| {
                    ServiceError::InvalidDeliveryData(format!(
                        "no delivery selected for pharmacy {}",
                        group.pharmacy_id
                    ))
                })?;

            let quote = self
                .quotes
                .find_option(user_id, group.pharmacy_id, postal_code, &selection.option_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidDeliveryData(format!(
                        "delivery option '{}' is not available for pharmacy {}",
                        selection.option_id, group.pharmacy_id
                    ))
                })?;

            priced.push(PricedGroup {
                detail: NewOrderDetail {
                    id: Uuid::new_v4(),
                    pharmacy_id: group.pharmacy_id,
                    delivery_fee: quote.fee,
                    delivery_option: quote.option_id,
                },
                group,
            });
        }

        Ok(priced)
    }

    async fn write_order(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        total_price: Decimal,
        priced: &[PricedGroup<'_>],
    ) -> Result<Uuid, ServiceError> {
        let order = self.orders.insert_order(txn, user_id, total_price).await?;

        let details: Vec<NewOrderDetail> = priced.iter().map(|p| p.detail.clone()).collect();
        self.orders.insert_details(txn, order.id, &details).await?;

        let mut inactive = Vec::new();
        let mut out_of_stock = Vec::new();

        for PricedGroup { detail, group } in priced {
            let mut lines = Vec::with_capacity(group.items.len());

            for item in &group.items {
                let removed = cart_item::Entity::delete_many()
                    .filter(cart_item::Column::Id.eq(item.cart_item_id))
                    .filter(cart_item::Column::UserId.eq(user_id))
                    .exec(txn)
                    .await?;
                if removed.rows_affected == 0 {
                    return Err(ServiceError::CartItemMissing(item.cart_item_id));
                }

                let level = self
                    .ledger
                    .decrement(txn, item.pharmacy_product_id, item.quantity)
                    .await?;
                if !level.sellable {
                    inactive.push(level.product_name.clone());
                }
                if level.is_negative() {
                    out_of_stock.push(level.product_name);
                }

                lines.push(NewLineItem {
                    pharmacy_product_id: item.pharmacy_product_id,
                    quantity: item.quantity,
                    price: item.unit_price,
                });
            }

            self.orders
                .insert_line_items(txn, detail.id, &lines)
                .await?;
        }

        if !inactive.is_empty() || !out_of_stock.is_empty() {
            warn!(?inactive, ?out_of_stock, "Checkout rejected, rolling back");
            return Err(ServiceError::ProductsUnavailable {
                inactive,
                out_of_stock,
            });
        }

        Ok(order.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_option_ids() {
        let request = CheckoutRequest {
            snapshot_id: Uuid::new_v4(),
            deliveries: vec![DeliverySelection {
                pharmacy_id: Uuid::new_v4(),
                option_id: String::new(),
            }],
        };
        assert!(request.validate().is_err());
    }
}
