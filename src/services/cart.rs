use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{cart_item, pharmacy, pharmacy_product, product};
use crate::errors::ServiceError;
use crate::services::cart_snapshot::{CartSnapshot, CartSnapshotStore, PharmacyGroup, SnapshotItem};

/// Turns selected cart lines into a priced, pharmacy-grouped snapshot
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    snapshots: CartSnapshotStore,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, snapshots: CartSnapshotStore) -> Self {
        Self { db, snapshots }
    }

    /// Freeze the given cart lines at current prices and store the snapshot.
    ///
    /// Groups keep the order in which their pharmacy first appears in
    /// `cart_item_ids`.
    #[instrument(skip(self, cart_item_ids), fields(lines = cart_item_ids.len()))]
    pub async fn prepare_checkout(
        &self,
        user_id: Uuid,
        cart_item_ids: &[Uuid],
    ) -> Result<CartSnapshot, ServiceError> {
        let mut wanted: Vec<Uuid> = Vec::with_capacity(cart_item_ids.len());
        for id in cart_item_ids {
            if !wanted.contains(id) {
                wanted.push(*id);
            }
        }
        if wanted.is_empty() {
            return Err(ServiceError::ValidationError(
                "select at least one cart item".to_string(),
            ));
        }

        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::Id.is_in(wanted.clone()))
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(pharmacy_product::Entity)
            .all(&*self.db)
            .await?;

        let mut lines: HashMap<Uuid, (cart_item::Model, pharmacy_product::Model)> = HashMap::new();
        for (item, listing) in rows {
            let listing = listing.ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "product of cart item {} no longer exists",
                    item.id
                ))
            })?;
            lines.insert(item.id, (item, listing));
        }

        if let Some(missing) = wanted.iter().find(|id| !lines.contains_key(id)) {
            return Err(ServiceError::NotFound(format!("cart item {} not found", missing)));
        }

        let product_ids: Vec<Uuid> = lines.values().map(|(_, l)| l.product_id).collect();
        let pharmacy_ids: Vec<Uuid> = lines.values().map(|(_, l)| l.pharmacy_id).collect();

        let product_names: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let pharmacy_names: HashMap<Uuid, String> = pharmacy::Entity::find()
            .filter(pharmacy::Column::Id.is_in(pharmacy_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut groups: Vec<PharmacyGroup> = Vec::new();
        for id in &wanted {
            let Some((item, listing)) = lines.remove(id) else {
                continue;
            };

            let unit_price = listing.price;
            let snapshot_item = SnapshotItem {
                cart_item_id: item.id,
                pharmacy_product_id: listing.id,
                product_name: product_names
                    .get(&listing.product_id)
                    .cloned()
                    .unwrap_or_default(),
                quantity: item.quantity,
                unit_price,
                subtotal: unit_price * Decimal::from(item.quantity),
            };

            match groups.iter_mut().find(|g| g.pharmacy_id == listing.pharmacy_id) {
                Some(group) => group.items.push(snapshot_item),
                None => groups.push(PharmacyGroup {
                    pharmacy_id: listing.pharmacy_id,
                    pharmacy_name: pharmacy_names
                        .get(&listing.pharmacy_id)
                        .cloned()
                        .unwrap_or_default(),
                    items: vec![snapshot_item],
                }),
            }
        }

        let snapshot = CartSnapshot::new(user_id, groups);
        self.snapshots.put(user_id, &snapshot).await?;

        info!(
            snapshot_id = %snapshot.id,
            groups = snapshot.groups.len(),
            "Prepared checkout snapshot"
        );
        Ok(snapshot)
    }
}
