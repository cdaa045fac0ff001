use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_cart_and_address_tables::Migration),
            Box::new(m20240301_000003_create_order_tables::Migration),
        ]
    }
}

mod m20240301_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Pharmacies::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Pharmacies::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Pharmacies::PharmacistId).uuid().not_null())
                        .col(ColumnDef::new(Pharmacies::Name).string().not_null())
                        .col(
                            ColumnDef::new(Pharmacies::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Pharmacies::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pharmacies_pharmacist_id")
                        .table(Pharmacies::Table)
                        .col(Pharmacies::PharmacistId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PharmacyProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PharmacyProducts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PharmacyProducts::PharmacyId).uuid().not_null())
                        .col(ColumnDef::new(PharmacyProducts::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(PharmacyProducts::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PharmacyProducts::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PharmacyProducts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(PharmacyProducts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PharmacyProducts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PharmacyProducts::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pharmacy_products_pharmacy")
                                .from(PharmacyProducts::Table, PharmacyProducts::PharmacyId)
                                .to(Pharmacies::Table, Pharmacies::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pharmacy_products_product")
                                .from(PharmacyProducts::Table, PharmacyProducts::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_pharmacy_products_pharmacy_id")
                        .table(PharmacyProducts::Table)
                        .col(PharmacyProducts::PharmacyId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PharmacyProducts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Pharmacies::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Pharmacies {
        Table,
        Id,
        PharmacistId,
        Name,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Products {
        Table,
        Id,
        Name,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub enum PharmacyProducts {
        Table,
        Id,
        PharmacyId,
        ProductId,
        Price,
        Stock,
        IsActive,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }
}

mod m20240301_000002_create_cart_and_address_tables {
    use super::m20240301_000001_create_catalog_tables::PharmacyProducts;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cart_and_address_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::PharmacyProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_pharmacy_product")
                                .from(CartItems::Table, CartItems::PharmacyProductId)
                                .to(PharmacyProducts::Table, PharmacyProducts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_id")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UserAddresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserAddresses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserAddresses::UserId).uuid().not_null())
                        .col(ColumnDef::new(UserAddresses::RecipientName).string().not_null())
                        .col(ColumnDef::new(UserAddresses::AddressLine).string().not_null())
                        .col(ColumnDef::new(UserAddresses::City).string().not_null())
                        .col(ColumnDef::new(UserAddresses::PostalCode).string().not_null())
                        .col(
                            ColumnDef::new(UserAddresses::IsActive)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(UserAddresses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_addresses_user_id")
                        .table(UserAddresses::Table)
                        .col(UserAddresses::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserAddresses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        PharmacyProductId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum UserAddresses {
        Table,
        Id,
        UserId,
        RecipientName,
        AddressLine,
        City,
        PostalCode,
        IsActive,
        CreatedAt,
    }
}

mod m20240301_000003_create_order_tables {
    use super::m20240301_000001_create_catalog_tables::{Pharmacies, PharmacyProducts};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalPrice)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::PaymentProof).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDetails::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDetails::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderDetails::PharmacyId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::DeliveryFee)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderDetails::DeliveryOption).string().not_null())
                        .col(
                            ColumnDef::new(OrderDetails::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_details_order")
                                .from(OrderDetails::Table, OrderDetails::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_details_pharmacy")
                                .from(OrderDetails::Table, OrderDetails::PharmacyId)
                                .to(Pharmacies::Table, Pharmacies::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_details_order_id")
                        .table(OrderDetails::Table)
                        .col(OrderDetails::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_details_pharmacy_status")
                        .table(OrderDetails::Table)
                        .col(OrderDetails::PharmacyId)
                        .col(OrderDetails::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderProductDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderProductDetails::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderProductDetails::OrderDetailId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderProductDetails::PharmacyProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderProductDetails::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderProductDetails::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderProductDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderProductDetails::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_product_details_detail")
                                .from(
                                    OrderProductDetails::Table,
                                    OrderProductDetails::OrderDetailId,
                                )
                                .to(OrderDetails::Table, OrderDetails::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_product_details_pharmacy_product")
                                .from(
                                    OrderProductDetails::Table,
                                    OrderProductDetails::PharmacyProductId,
                                )
                                .to(PharmacyProducts::Table, PharmacyProducts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_product_details_detail_id")
                        .table(OrderProductDetails::Table)
                        .col(OrderProductDetails::OrderDetailId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderProductDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        UserId,
        TotalPrice,
        PaymentProof,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderDetails {
        Table,
        Id,
        OrderId,
        PharmacyId,
        DeliveryFee,
        DeliveryOption,
        Status,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    enum OrderProductDetails {
        Table,
        Id,
        OrderDetailId,
        PharmacyProductId,
        Quantity,
        Price,
        CreatedAt,
        DeletedAt,
    }
}
