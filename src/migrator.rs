use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_warranty_registrations_table::Migration),
            Box::new(m20240301_000002_create_outbox_events_table::Migration),
        ]
    }
}

// Migration implementations. These mirror the standalone `migrations` crate
// so the binary can migrate on startup without the external CLI.

mod m20240301_000001_create_warranty_registrations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_warranty_registrations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WarrantyRegistrations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WarrantyRegistrations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::CustomerEmail)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::CustomerName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WarrantyRegistrations::Phone).string().null())
                        .col(
                            ColumnDef::new(WarrantyRegistrations::VehicleModelId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::VehicleModelName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::Vin)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::PurchaseDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::PeriodYears)
                                .small_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::DealerName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::InvoiceRef)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::SignatureRef)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::ReviewStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::DeclineReason)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::ReviewedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarrantyRegistrations::ReviewedBy)
                                .string()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_warranty_registrations_customer_email")
                        .table(WarrantyRegistrations::Table)
                        .col(WarrantyRegistrations::CustomerEmail)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_warranty_registrations_vin")
                        .table(WarrantyRegistrations::Table)
                        .col(WarrantyRegistrations::Vin)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_warranty_registrations_dealer_name")
                        .table(WarrantyRegistrations::Table)
                        .col(WarrantyRegistrations::DealerName)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_warranty_registrations_review_status")
                        .table(WarrantyRegistrations::Table)
                        .col(WarrantyRegistrations::ReviewStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WarrantyRegistrations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WarrantyRegistrations {
        Table,
        Id,
        CustomerEmail,
        CustomerName,
        Phone,
        VehicleModelId,
        VehicleModelName,
        Vin,
        PurchaseDate,
        PeriodYears,
        DealerName,
        InvoiceRef,
        SignatureRef,
        ReviewStatus,
        DeclineReason,
        CreatedAt,
        ReviewedAt,
        ReviewedBy,
    }
}

mod m20240301_000002_create_outbox_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_outbox_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OutboxEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OutboxEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::AggregateType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OutboxEvents::AggregateId).uuid().null())
                        .col(ColumnDef::new(OutboxEvents::EventType).string().not_null())
                        .col(
                            ColumnDef::new(OutboxEvents::Payload)
                                .json_binary()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::Status)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OutboxEvents::ErrorMessage).text().null())
                        .col(
                            ColumnDef::new(OutboxEvents::AvailableAt)
                                .timestamp()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::CreatedAt)
                                .timestamp()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(ColumnDef::new(OutboxEvents::UpdatedAt).timestamp().null())
                        .col(ColumnDef::new(OutboxEvents::ProcessedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_outbox_events_status_available_at")
                        .table(OutboxEvents::Table)
                        .col(OutboxEvents::Status)
                        .col(OutboxEvents::AvailableAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OutboxEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OutboxEvents {
        Table,
        Id,
        AggregateType,
        AggregateId,
        EventType,
        Payload,
        Status,
        Attempts,
        ErrorMessage,
        AvailableAt,
        CreatedAt,
        UpdatedAt,
        ProcessedAt,
    }
}
