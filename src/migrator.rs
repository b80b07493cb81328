use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_coupons_table::Migration),
            Box::new(m20240301_000002_create_coupon_usages_table::Migration),
            Box::new(m20240301_000003_create_coupon_validation_attempts_table::Migration),
            Box::new(m20240301_000004_create_orders_table::Migration),
            Box::new(m20240301_000005_create_order_status_history_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_coupons_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create coupons table aligned with entities::coupon Model
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::Description).string().null())
                        .col(
                            ColumnDef::new(Coupons::DiscountType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::DiscountValue)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::ValidFrom).timestamp().not_null())
                        .col(ColumnDef::new(Coupons::ValidUntil).timestamp().null())
                        .col(ColumnDef::new(Coupons::MaxUses).integer().null())
                        .col(
                            ColumnDef::new(Coupons::MaxUsesPerCustomer)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Coupons::CurrentUses)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::MinOrderValue)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::MinOrderItems)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsOneTimeUse)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Coupons::AppliesToDiscountedItems)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Coupons::ApplicableProducts).json().null())
                        .col(ColumnDef::new(Coupons::ExcludedProducts).json().null())
                        .col(ColumnDef::new(Coupons::ApplicableCategories).json().null())
                        .col(ColumnDef::new(Coupons::ExcludedCategories).json().null())
                        .col(ColumnDef::new(Coupons::BuyXCount).integer().null())
                        .col(ColumnDef::new(Coupons::GetYCount).integer().null())
                        .col(
                            ColumnDef::new(Coupons::CustomerTier)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Coupons::MinCustomerOrders).integer().null())
                        .col(ColumnDef::new(Coupons::MaxCustomerOrders).integer().null())
                        .col(ColumnDef::new(Coupons::MinCustomerSpent).decimal().null())
                        .col(ColumnDef::new(Coupons::MinCategoryItems).integer().null())
                        .col(
                            ColumnDef::new(Coupons::CombinableWithDiscounts)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Coupons::CombinableWithCoupons)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Coupons::UsageIntervalDays).integer().null())
                        .col(ColumnDef::new(Coupons::TimeRestrictions).json().null())
                        .col(ColumnDef::new(Coupons::SeasonalRestrictions).json().null())
                        .col(ColumnDef::new(Coupons::TieredDiscounts).json().null())
                        .col(
                            ColumnDef::new(Coupons::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Coupons::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Coupons::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_is_active")
                        .table(Coupons::Table)
                        .col(Coupons::IsActive)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_valid_until")
                        .table(Coupons::Table)
                        .col(Coupons::ValidUntil)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Coupons {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        DiscountValue,
        ValidFrom,
        ValidUntil,
        MaxUses,
        MaxUsesPerCustomer,
        CurrentUses,
        MinOrderValue,
        MinOrderItems,
        IsActive,
        IsOneTimeUse,
        AppliesToDiscountedItems,
        ApplicableProducts,
        ExcludedProducts,
        ApplicableCategories,
        ExcludedCategories,
        BuyXCount,
        GetYCount,
        CustomerTier,
        MinCustomerOrders,
        MaxCustomerOrders,
        MinCustomerSpent,
        MinCategoryItems,
        CombinableWithDiscounts,
        CombinableWithCoupons,
        UsageIntervalDays,
        TimeRestrictions,
        SeasonalRestrictions,
        TieredDiscounts,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_coupon_usages_table {

    use sea_orm_migration::prelude::*;

    use super::m20240301_000001_create_coupons_table::Coupons;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_coupon_usages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CouponUsages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponUsages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponUsages::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::OrderId).uuid().null())
                        .col(ColumnDef::new(CouponUsages::UsedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usages_coupon_id")
                                .from(CouponUsages::Table, CouponUsages::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_coupon_customer")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::CouponId)
                        .col(CouponUsages::CustomerId)
                        .to_owned(),
                )
                .await?;

            // Replayed apply requests for the same order dedupe on this pair.
            // NULL order ids never collide, so cart-stage usages are exempt.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_coupon_order")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::CouponId)
                        .col(CouponUsages::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponUsages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CouponUsages {
        Table,
        Id,
        CouponId,
        CustomerId,
        OrderId,
        UsedAt,
    }
}

mod m20240301_000003_create_coupon_validation_attempts_table {

    use sea_orm_migration::prelude::*;

    use super::m20240301_000001_create_coupons_table::Coupons;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_coupon_validation_attempts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CouponValidationAttempts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponValidationAttempts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::CouponId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::CustomerId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::AttemptedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::IsValid)
                                .boolean()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::FailureReason)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::CartValue)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CouponValidationAttempts::CartItemCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_validation_attempts_coupon_id")
                                .from(
                                    CouponValidationAttempts::Table,
                                    CouponValidationAttempts::CouponId,
                                )
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_validation_attempts_coupon_id")
                        .table(CouponValidationAttempts::Table)
                        .col(CouponValidationAttempts::CouponId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_validation_attempts_attempted_at")
                        .table(CouponValidationAttempts::Table)
                        .col(CouponValidationAttempts::AttemptedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(CouponValidationAttempts::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CouponValidationAttempts {
        Table,
        Id,
        CouponId,
        CustomerId,
        AttemptedAt,
        IsValid,
        FailureReason,
        CartValue,
        CartItemCount,
    }
}

mod m20240301_000004_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create orders table aligned with entities::order Model
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Tax).decimal().not_null().default(0))
                        .col(
                            ColumnDef::new(Orders::DeliveryFee)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Total)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::AppliedCouponId).uuid().null())
                        .col(ColumnDef::new(Orders::DeliveryMethod).string().null())
                        .col(ColumnDef::new(Orders::DeliveryAddress).string().null())
                        .col(
                            ColumnDef::new(Orders::ProcessingStartedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::ReadyAt).timestamp().null())
                        .col(ColumnDef::new(Orders::ShippedAt).timestamp().null())
                        .col(ColumnDef::new(Orders::DeliveredAt).timestamp().null())
                        .col(ColumnDef::new(Orders::CancelledAt).timestamp().null())
                        .col(ColumnDef::new(Orders::RefundedAt).timestamp().null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Status,
        PaymentStatus,
        Subtotal,
        Tax,
        DeliveryFee,
        DiscountAmount,
        Total,
        AppliedCouponId,
        DeliveryMethod,
        DeliveryAddress,
        ProcessingStartedAt,
        ReadyAt,
        ShippedAt,
        DeliveredAt,
        CancelledAt,
        RefundedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_order_status_history_table {

    use sea_orm_migration::prelude::*;

    use super::m20240301_000004_create_orders_table::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_order_status_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderStatusHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderStatusHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderStatusHistory::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderStatusHistory::OldStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderStatusHistory::NewStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderStatusHistory::ChangedBy).uuid().null())
                        .col(
                            ColumnDef::new(OrderStatusHistory::ChangedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderStatusHistory::Notes).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_status_history_order_id")
                                .from(OrderStatusHistory::Table, OrderStatusHistory::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_status_history_order_id")
                        .table(OrderStatusHistory::Table)
                        .col(OrderStatusHistory::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderStatusHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderStatusHistory {
        Table,
        Id,
        OrderId,
        OldStatus,
        NewStatus,
        ChangedBy,
        ChangedAt,
        Notes,
    }
}
