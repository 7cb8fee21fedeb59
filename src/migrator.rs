use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_reference_tables::Migration),
            Box::new(m20240101_000002_create_stock_tables::Migration),
            Box::new(m20240101_000003_create_production_tables::Migration),
            Box::new(m20240101_000004_create_recall_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_reference_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(
                            ColumnDef::new(Suppliers::ApprovalStatus)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::ContactEmail).string().null())
                        .col(ColumnDef::new(Customers::ContactPhone).string().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(StockItems::Name).string().not_null())
                        .col(ColumnDef::new(StockItems::DefaultUnit).string().not_null())
                        .col(
                            ColumnDef::new(StockItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        Name,
        ApprovalStatus,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        Name,
        ContactEmail,
        ContactPhone,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockItems {
        Table,
        Id,
        Name,
        DefaultUnit,
        CreatedAt,
    }
}

mod m20240101_000002_create_stock_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Deliveries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Deliveries::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Deliveries::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::DeliveryDate).date().not_null())
                        .col(ColumnDef::new(Deliveries::Reference).string().null())
                        .col(
                            ColumnDef::new(Deliveries::CreatedAt)
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
                        .name("idx_deliveries_supplier_id")
                        .table(Deliveries::Table)
                        .col(Deliveries::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryLines::DeliveryId).uuid().not_null())
                        .col(ColumnDef::new(DeliveryLines::StockBatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(DeliveryLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::BatchCode).string().not_null())
                        .col(ColumnDef::new(StockBatches::StockItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockBatches::QuantityReceived)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::QuantityRemaining)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::Unit).string().not_null())
                        .col(
                            ColumnDef::new(StockBatches::Status)
                                .string()
                                .not_null()
                                .default("active"),
                        )
                        .col(ColumnDef::new(StockBatches::UseByDate).date().null())
                        .col(ColumnDef::new(StockBatches::BestBeforeDate).date().null())
                        .col(ColumnDef::new(StockBatches::Allergens).json().not_null())
                        .col(ColumnDef::new(StockBatches::DeliveryLineId).uuid().null())
                        .col(ColumnDef::new(StockBatches::ProductionBatchId).uuid().null())
                        .col(
                            ColumnDef::new(StockBatches::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(StockBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::UpdatedAt)
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
                        .name("idx_stock_batches_batch_code")
                        .table(StockBatches::Table)
                        .col(StockBatches::BatchCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_batches_production_batch_id")
                        .table(StockBatches::Table)
                        .col(StockBatches::ProductionBatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_batches_status")
                        .table(StockBatches::Table)
                        .col(StockBatches::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::StockBatchId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::MovementType).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Unit).string().not_null())
                        .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                        .col(ColumnDef::new(StockMovements::ReferenceType).string().null())
                        .col(ColumnDef::new(StockMovements::ReferenceId).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
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
                        .name("idx_stock_movements_stock_batch_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::StockBatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DeliveryLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Deliveries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Deliveries {
        Table,
        Id,
        SupplierId,
        DeliveryDate,
        Reference,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum DeliveryLines {
        Table,
        Id,
        DeliveryId,
        StockBatchId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockBatches {
        Table,
        Id,
        BatchCode,
        StockItemId,
        QuantityReceived,
        QuantityRemaining,
        Unit,
        Status,
        UseByDate,
        BestBeforeDate,
        Allergens,
        DeliveryLineId,
        ProductionBatchId,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        StockBatchId,
        MovementType,
        Quantity,
        Unit,
        Reason,
        ReferenceType,
        ReferenceId,
        CreatedAt,
    }
}

mod m20240101_000003_create_production_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_production_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductionBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductionBatches::BatchCode).string().not_null())
                        .col(ColumnDef::new(ProductionBatches::RecipeId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductionBatches::ProductionDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatches::Status)
                                .string()
                                .not_null()
                                .default("planned"),
                        )
                        .col(
                            ColumnDef::new(ProductionBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatches::UpdatedAt)
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
                        .name("idx_production_batches_batch_code")
                        .table(ProductionBatches::Table)
                        .col(ProductionBatches::BatchCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductionBatchInputs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionBatchInputs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::ProductionBatchId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::StockBatchId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::StockItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::PlannedQuantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::ActualQuantity)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(ProductionBatchInputs::Unit).string().not_null())
                        .col(
                            ColumnDef::new(ProductionBatchInputs::IsRework)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::ReworkSourceBatchId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductionBatchInputs::CreatedAt)
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
                        .name("idx_production_batch_inputs_production_batch_id")
                        .table(ProductionBatchInputs::Table)
                        .col(ProductionBatchInputs::ProductionBatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_batch_inputs_stock_batch_id")
                        .table(ProductionBatchInputs::Table)
                        .col(ProductionBatchInputs::StockBatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DispatchRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DispatchRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DispatchRecords::StockBatchId).uuid().not_null())
                        .col(ColumnDef::new(DispatchRecords::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(DispatchRecords::CustomerName).string().not_null())
                        .col(
                            ColumnDef::new(DispatchRecords::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(DispatchRecords::Unit).string().not_null())
                        .col(ColumnDef::new(DispatchRecords::DispatchDate).date().not_null())
                        .col(
                            ColumnDef::new(DispatchRecords::CreatedAt)
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
                        .name("idx_dispatch_records_stock_batch_id")
                        .table(DispatchRecords::Table)
                        .col(DispatchRecords::StockBatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DispatchRecords::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductionBatchInputs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductionBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductionBatches {
        Table,
        Id,
        BatchCode,
        RecipeId,
        ProductionDate,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductionBatchInputs {
        Table,
        Id,
        ProductionBatchId,
        StockBatchId,
        StockItemId,
        PlannedQuantity,
        ActualQuantity,
        Unit,
        IsRework,
        ReworkSourceBatchId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum DispatchRecords {
        Table,
        Id,
        StockBatchId,
        CustomerId,
        CustomerName,
        Quantity,
        Unit,
        DispatchDate,
        CreatedAt,
    }
}

mod m20240101_000004_create_recall_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_recall_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Recalls::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Recalls::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Recalls::RecallCode).string().not_null())
                        .col(ColumnDef::new(Recalls::RecallType).string().not_null())
                        .col(ColumnDef::new(Recalls::Severity).string().not_null())
                        .col(
                            ColumnDef::new(Recalls::Status)
                                .string()
                                .not_null()
                                .default("draft"),
                        )
                        .col(ColumnDef::new(Recalls::Reason).text().not_null())
                        .col(ColumnDef::new(Recalls::RootCause).text().null())
                        .col(ColumnDef::new(Recalls::CorrectiveActions).text().null())
                        .col(
                            ColumnDef::new(Recalls::InitiatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Recalls::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Recalls::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Recalls::FsaNotified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Recalls::FsaNotifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Recalls::FsaReference).string().null())
                        .col(
                            ColumnDef::new(Recalls::LocalAuthorityNotified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Recalls::LocalAuthorityNotifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Recalls::LocalAuthorityReference)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Recalls::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Recalls::UpdatedAt)
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
                        .name("idx_recalls_recall_code")
                        .table(Recalls::Table)
                        .col(Recalls::RecallCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RecallAffectedBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecallAffectedBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecallAffectedBatches::RecallId).uuid().not_null())
                        .col(
                            ColumnDef::new(RecallAffectedBatches::StockBatchId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecallAffectedBatches::BatchType).string().not_null())
                        .col(
                            ColumnDef::new(RecallAffectedBatches::QuantityAffected)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecallAffectedBatches::QuantityRecovered)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(RecallAffectedBatches::ActionTaken)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(RecallAffectedBatches::Notes).text().null())
                        .col(
                            ColumnDef::new(RecallAffectedBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecallAffectedBatches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One registration per batch per recall
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_recall_affected_batches_recall_batch")
                        .table(RecallAffectedBatches::Table)
                        .col(RecallAffectedBatches::RecallId)
                        .col(RecallAffectedBatches::StockBatchId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RecallNotifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecallNotifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecallNotifications::RecallId).uuid().not_null())
                        .col(
                            ColumnDef::new(RecallNotifications::CustomerName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecallNotifications::ContactEmail).string().null())
                        .col(ColumnDef::new(RecallNotifications::ContactPhone).string().null())
                        .col(
                            ColumnDef::new(RecallNotifications::NotificationMethod)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecallNotifications::NotifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RecallNotifications::ResponseReceived)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(RecallNotifications::ResponseNotes).text().null())
                        .col(
                            ColumnDef::new(RecallNotifications::CreatedAt)
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
                        .name("idx_recall_notifications_recall_id")
                        .table(RecallNotifications::Table)
                        .col(RecallNotifications::RecallId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RecallNotifications::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RecallAffectedBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Recalls::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Recalls {
        Table,
        Id,
        RecallCode,
        RecallType,
        Severity,
        Status,
        Reason,
        RootCause,
        CorrectiveActions,
        InitiatedAt,
        ResolvedAt,
        ClosedAt,
        FsaNotified,
        FsaNotifiedAt,
        FsaReference,
        LocalAuthorityNotified,
        LocalAuthorityNotifiedAt,
        LocalAuthorityReference,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RecallAffectedBatches {
        Table,
        Id,
        RecallId,
        StockBatchId,
        BatchType,
        QuantityAffected,
        QuantityRecovered,
        ActionTaken,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RecallNotifications {
        Table,
        Id,
        RecallId,
        CustomerName,
        ContactEmail,
        ContactPhone,
        NotificationMethod,
        NotifiedAt,
        ResponseReceived,
        ResponseNotes,
        CreatedAt,
    }
}
